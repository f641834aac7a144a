use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Economic parameters of the escrow market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPolicy {
    /// Review window after submission, in seconds. Once it elapses,
    /// anyone may trigger auto-approval.
    #[serde(default = "default_auto_approve_period_secs")]
    pub auto_approve_period_secs: u64,

    /// Worker collateral as an integer percentage of the bounty.
    #[serde(default = "default_worker_stake_percentage")]
    pub worker_stake_percentage: u32,

    /// Platform cut as an integer percentage of the bounty, taken only on
    /// the approval paths.
    #[serde(default = "default_platform_fee_percentage")]
    pub platform_fee_percentage: u32,
}

fn default_auto_approve_period_secs() -> u64 {
    48 * 60 * 60
}

fn default_worker_stake_percentage() -> u32 {
    10
}

fn default_platform_fee_percentage() -> u32 {
    2
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            auto_approve_period_secs: default_auto_approve_period_secs(),
            worker_stake_percentage: default_worker_stake_percentage(),
            platform_fee_percentage: default_platform_fee_percentage(),
        }
    }
}

impl EscrowPolicy {
    pub fn auto_approve_period(&self) -> Duration {
        Duration::seconds(self.auto_approve_period_secs as i64)
    }

    /// Load a policy from a JSON file; missing fields take the reference
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let policy: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse policy file {}", path.display()))?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let policy = EscrowPolicy::default();
        assert_eq!(policy.auto_approve_period_secs, 48 * 60 * 60);
        assert_eq!(policy.worker_stake_percentage, 10);
        assert_eq!(policy.platform_fee_percentage, 2);
        assert_eq!(policy.auto_approve_period(), Duration::hours(48));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let policy: EscrowPolicy =
            serde_json::from_str(r#"{"platform_fee_percentage": 5}"#).unwrap();
        assert_eq!(policy.platform_fee_percentage, 5);
        assert_eq!(policy.worker_stake_percentage, 10);
        assert_eq!(policy.auto_approve_period_secs, 48 * 60 * 60);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("agora-policy-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"auto_approve_period_secs": 3600}"#).unwrap();

        let policy = EscrowPolicy::load(&path).unwrap();
        assert_eq!(policy.auto_approve_period(), Duration::hours(1));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = EscrowPolicy::load("/nonexistent/agora-policy.json").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
