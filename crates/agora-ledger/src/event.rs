use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use agora_types::{Amount, DisputeId, TaskId};

/// Kinds of market events, for indexed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TaskCreated,
    TaskClaimed,
    WorkSubmitted,
    WorkApproved,
    DisputeOpened,
    DisputeResolved,
    TaskCancelled,
    FeesWithdrawn,
    AgentRegistered,
    AgentUpdated,
    AgentDeactivated,
    AgentReactivated,
    SkillAdded,
    SkillVerified,
    ReputationChanged,
    EarningsRecorded,
}

/// A domain event, typed with exactly the payload off-chain consumers index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    TaskCreated {
        task_id: TaskId,
        creator: Uuid,
        bounty: Amount,
        metadata_uri: String,
    },
    TaskClaimed {
        task_id: TaskId,
        worker: Uuid,
        stake: Amount,
    },
    WorkSubmitted {
        task_id: TaskId,
        worker: Uuid,
        submission_uri: String,
    },
    WorkApproved {
        task_id: TaskId,
        /// `None` when approval was triggered by the permissionless
        /// auto-approve path rather than the creator.
        approver: Option<Uuid>,
        auto_approved: bool,
    },
    DisputeOpened {
        task_id: TaskId,
        dispute_id: DisputeId,
        opened_by: Uuid,
        reason: String,
    },
    DisputeResolved {
        task_id: TaskId,
        dispute_id: DisputeId,
        winner: Uuid,
        note: String,
    },
    TaskCancelled {
        task_id: TaskId,
        creator: Uuid,
    },
    FeesWithdrawn {
        recipient: Uuid,
        amount: Amount,
    },
    AgentRegistered {
        agent: Uuid,
        public_key: String,
        metadata_uri: String,
    },
    AgentUpdated {
        agent: Uuid,
        public_key: String,
        metadata_uri: String,
    },
    AgentDeactivated {
        agent: Uuid,
    },
    AgentReactivated {
        agent: Uuid,
    },
    SkillAdded {
        agent: Uuid,
        skill_hash: String,
        name: String,
        category: String,
        level: u8,
    },
    SkillVerified {
        agent: Uuid,
        skill_hash: String,
        verifier: Uuid,
        proof_uri: String,
    },
    ReputationChanged {
        agent: Uuid,
        task_ref: Option<TaskId>,
        delta: i64,
        new_score: i64,
    },
    EarningsRecorded {
        agent: Uuid,
        amount: Amount,
        total_earnings: Amount,
    },
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskCreated { .. } => EventKind::TaskCreated,
            Self::TaskClaimed { .. } => EventKind::TaskClaimed,
            Self::WorkSubmitted { .. } => EventKind::WorkSubmitted,
            Self::WorkApproved { .. } => EventKind::WorkApproved,
            Self::DisputeOpened { .. } => EventKind::DisputeOpened,
            Self::DisputeResolved { .. } => EventKind::DisputeResolved,
            Self::TaskCancelled { .. } => EventKind::TaskCancelled,
            Self::FeesWithdrawn { .. } => EventKind::FeesWithdrawn,
            Self::AgentRegistered { .. } => EventKind::AgentRegistered,
            Self::AgentUpdated { .. } => EventKind::AgentUpdated,
            Self::AgentDeactivated { .. } => EventKind::AgentDeactivated,
            Self::AgentReactivated { .. } => EventKind::AgentReactivated,
            Self::SkillAdded { .. } => EventKind::SkillAdded,
            Self::SkillVerified { .. } => EventKind::SkillVerified,
            Self::ReputationChanged { .. } => EventKind::ReputationChanged,
            Self::EarningsRecorded { .. } => EventKind::EarningsRecorded,
        }
    }

    /// The task this event concerns, if it concerns one.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskClaimed { task_id, .. }
            | Self::WorkSubmitted { task_id, .. }
            | Self::WorkApproved { task_id, .. }
            | Self::DisputeOpened { task_id, .. }
            | Self::DisputeResolved { task_id, .. }
            | Self::TaskCancelled { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}

/// An immutable, hash-chained record of one market event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub event: MarketEvent,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub hash: String,
}

impl EventRecord {
    pub fn new(event: MarketEvent, timestamp: DateTime<Utc>, previous_hash: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let hash = Self::compute_hash(id, &event, timestamp, previous_hash.as_deref());
        Self {
            id,
            event,
            timestamp,
            previous_hash,
            hash,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    fn compute_hash(
        id: Uuid,
        event: &MarketEvent,
        timestamp: DateTime<Utc>,
        previous_hash: Option<&str>,
    ) -> String {
        let payload = serde_json::to_string(event).unwrap_or_default();
        let input = format!(
            "{}:{}:{}:{}",
            id,
            timestamp.timestamp_nanos_opt().unwrap_or(0),
            payload,
            previous_hash.unwrap_or("genesis"),
        );
        let digest = Sha256::digest(input.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Recompute the hash from the record's own fields and compare.
    pub fn verify_hash(&self) -> bool {
        self.hash
            == Self::compute_hash(
                self.id,
                &self.event,
                self.timestamp,
                self.previous_hash.as_deref(),
            )
    }
}
