use thiserror::Error;
use uuid::Uuid;

use crate::amount::Amount;
use crate::role::Role;
use crate::task::{DisputeId, TaskId, TaskStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgoraError {
    // Input validation — rejected before any state mutation or fund movement.
    #[error("Bounty must be greater than zero")]
    InvalidBounty,

    #[error("Metadata reference must not be empty")]
    InvalidMetadata,

    #[error("Public key must not be empty")]
    InvalidPublicKey,

    #[error("Resolution winner {0} is neither the task creator nor its worker")]
    InvalidResolution(Uuid),

    #[error("Skill level {0} is outside the accepted 1..=5 range")]
    InvalidSkillLevel(u8),

    // State-machine violations — the attempted transition is illegal from the
    // task's current state; no partial effect.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Dispute not found: {0}")]
    DisputeNotFound(DisputeId),

    #[error("Task is not open: status is {status:?}")]
    TaskNotOpen { status: TaskStatus },

    #[error("Task is not claimed: status is {status:?}")]
    TaskNotClaimed { status: TaskStatus },

    #[error("Task is not submitted: status is {status:?}")]
    TaskNotSubmitted { status: TaskStatus },

    #[error("Task is not disputed: status is {status:?}")]
    TaskNotDisputed { status: TaskStatus },

    #[error("Cannot cancel a task once claimed: status is {status:?}")]
    CannotCancelClaimedTask { status: TaskStatus },

    #[error("Task already has an open dispute: {0}")]
    DisputeAlreadyExists(DisputeId),

    // Authorization — caller identity lacks the required relationship or role.
    #[error("Caller is not the task creator")]
    NotTaskCreator,

    #[error("Caller is not the task worker")]
    NotTaskWorker,

    #[error("Caller is neither the task creator nor its worker")]
    NotTaskParticipant,

    #[error("Agent not registered or not active: {0}")]
    AgentNotRegistered(Uuid),

    #[error("Agent already registered: {0}")]
    AlreadyRegistered(Uuid),

    #[error("Agents cannot verify their own skills")]
    CannotSelfVerify,

    #[error("Skill already registered under hash {0}")]
    SkillAlreadyAdded(String),

    #[error("Skill not found under hash {0}")]
    SkillNotFound(String),

    #[error("Access denied: {actor} does not hold the {role:?} role")]
    AccessDenied { actor: Uuid, role: Role },

    // Timing — the call is legal in isolation but outside its valid window.
    #[error("Auto-approve period has passed")]
    AutoApprovePeriodPassed,

    #[error("Auto-approve period has not been reached")]
    AutoApprovePeriodNotReached,

    // Operational
    #[error("Contract is paused")]
    Paused,

    // Token ledger
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("Insufficient allowance: needed {needed}, approved {approved}")]
    InsufficientAllowance { needed: Amount, approved: Amount },
}

pub type Result<T> = std::result::Result<T, AgoraError>;
