use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{DisputeId, TaskId};

/// Outcome of an arbitrated dispute, set exactly once at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    /// The task's creator or worker — never a third party.
    pub winner: Uuid,
    pub note: String,
    pub resolved_at: DateTime<Utc>,
}

/// A dispute filed against a submitted task. One-to-one with its task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub task_id: TaskId,
    /// The task creator or worker who opened it.
    pub opened_by: Uuid,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
    pub resolution: Option<DisputeResolution>,
}

impl Dispute {
    pub fn new(
        id: DisputeId,
        task_id: TaskId,
        opened_by: Uuid,
        reason: impl Into<String>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            opened_by,
            reason: reason.into(),
            opened_at,
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_dispute_is_unresolved() {
        let dispute = Dispute::new(0, 7, Uuid::new_v4(), "work not satisfactory", Utc::now());
        assert_eq!(dispute.task_id, 7);
        assert!(!dispute.is_resolved());
    }

    #[test]
    fn test_resolution_records_winner() {
        let winner = Uuid::new_v4();
        let mut dispute = Dispute::new(0, 0, Uuid::new_v4(), "reason", Utc::now());
        dispute.resolution = Some(DisputeResolution {
            winner,
            note: "worker wins".into(),
            resolved_at: Utc::now(),
        });
        assert!(dispute.is_resolved());
        assert_eq!(dispute.resolution.unwrap().winner, winner);
    }
}
