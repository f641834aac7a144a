use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::{AgoraError, Result};

/// Tasks are numbered sequentially by the escrow arena, starting at 0.
pub type TaskId = u64;

/// Disputes share the same sequential numbering scheme.
pub type DisputeId = u64;

/// Task lifecycle states. `Approved`, `Resolved` and `Cancelled` are
/// terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Open,
    Claimed,
    Submitted,
    Approved,
    Disputed,
    Resolved,
    Cancelled,
}

/// Actions that drive task state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskAction {
    Claim,
    Cancel,
    Submit,
    Approve,
    AutoApprove,
    Dispute,
    Resolve,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state and all escrowed value
    /// for it has been disbursed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Approved | TaskStatus::Resolved | TaskStatus::Cancelled
        )
    }

    /// Attempt a state transition given an action.
    ///
    /// Returns the new state, or the state-machine error naming what the
    /// action required. Every edge not listed here is illegal.
    pub fn transition(self, action: TaskAction) -> Result<TaskStatus> {
        match (self, action) {
            (TaskStatus::Open, TaskAction::Claim) => Ok(TaskStatus::Claimed),
            (TaskStatus::Open, TaskAction::Cancel) => Ok(TaskStatus::Cancelled),
            (TaskStatus::Claimed, TaskAction::Submit) => Ok(TaskStatus::Submitted),
            (TaskStatus::Submitted, TaskAction::Approve) => Ok(TaskStatus::Approved),
            (TaskStatus::Submitted, TaskAction::AutoApprove) => Ok(TaskStatus::Approved),
            (TaskStatus::Submitted, TaskAction::Dispute) => Ok(TaskStatus::Disputed),
            (TaskStatus::Disputed, TaskAction::Resolve) => Ok(TaskStatus::Resolved),

            (status, TaskAction::Claim) => Err(AgoraError::TaskNotOpen { status }),
            (status, TaskAction::Cancel) => Err(AgoraError::CannotCancelClaimedTask { status }),
            (status, TaskAction::Submit) => Err(AgoraError::TaskNotClaimed { status }),
            (status, TaskAction::Approve | TaskAction::AutoApprove | TaskAction::Dispute) => {
                Err(AgoraError::TaskNotSubmitted { status })
            }
            (status, TaskAction::Resolve) => Err(AgoraError::TaskNotDisputed { status }),
        }
    }
}

/// A bounty task held in escrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub creator: Uuid,
    /// Unset until claimed, immutable once set.
    pub worker: Option<Uuid>,
    /// Locked at creation, immutable.
    pub bounty: Amount,
    /// Computed and locked at claim time from the bounty at that moment.
    pub worker_stake: Amount,
    pub metadata_uri: String,
    /// Empty until work is submitted.
    pub submission_uri: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub creator_approved: bool,
    pub auto_approved: bool,
    pub dispute_id: Option<DisputeId>,
}

impl Task {
    pub fn new(
        id: TaskId,
        creator: Uuid,
        bounty: Amount,
        metadata_uri: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creator,
            worker: None,
            bounty,
            worker_stake: 0,
            metadata_uri: metadata_uri.into(),
            submission_uri: String::new(),
            status: TaskStatus::Open,
            created_at,
            submitted_at: None,
            creator_approved: false,
            auto_approved: false,
            dispute_id: None,
        }
    }

    /// Apply a state transition action.
    pub fn apply(&mut self, action: TaskAction) -> Result<()> {
        self.status = self.status.transition(action)?;
        Ok(())
    }

    /// Total value currently locked in escrow for this task. Zero once the
    /// task is terminal.
    pub fn locked_value(&self) -> Amount {
        if self.status.is_terminal() {
            0
        } else {
            self.bounty + self.worker_stake
        }
    }
}
