use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;

/// Neutral score assigned on registration.
pub const BASE_REPUTATION: i64 = 5000;

/// Scores are clamped to [0, MAX_REPUTATION].
pub const MAX_REPUTATION: i64 = 10_000;

/// Applied on a recorded successful completion.
pub const COMPLETION_REWARD: i64 = 100;

/// Applied on a recorded failure. Double the reward: unreliable agents lose
/// ground twice as fast as reliable ones gain it.
pub const FAILURE_PENALTY: i64 = 200;

/// An agent's registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: Uuid,
    pub public_key: String,
    pub metadata_uri: String,
    pub is_active: bool,
    pub reputation_score: i64,
    pub total_tasks_completed: u64,
    pub total_tasks_failed: u64,
    pub total_earnings: Amount,
    pub registered_at: DateTime<Utc>,
}

impl AgentProfile {
    pub fn new(
        id: Uuid,
        public_key: impl Into<String>,
        metadata_uri: impl Into<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            public_key: public_key.into(),
            metadata_uri: metadata_uri.into(),
            is_active: true,
            reputation_score: BASE_REPUTATION,
            total_tasks_completed: 0,
            total_tasks_failed: 0,
            total_earnings: 0,
            registered_at,
        }
    }

    /// Display percentage: base 5000 maps to 50%, clamped to [0, 100].
    pub fn reputation_percentage(&self) -> u8 {
        (self.reputation_score / 100).clamp(0, 100) as u8
    }

    /// Apply a signed reputation delta, clamping to the score bounds.
    pub fn apply_reputation_delta(&mut self, delta: i64) {
        self.reputation_score = (self.reputation_score + delta).clamp(0, MAX_REPUTATION);
    }
}

/// One entry in an agent's reputation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    /// The task that triggered the change, when one did.
    pub task_ref: Option<u64>,
    pub delta: i64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A declared skill, keyed by the hash of (name, category).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub hash: String,
    pub name: String,
    pub category: String,
    /// Self-assessed proficiency, 1..=5.
    pub level: u8,
    pub added_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verifier: Option<Uuid>,
    pub proof_uri: Option<String>,
}

impl Skill {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}
