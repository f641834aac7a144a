use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgoraError, Result};

/// Administrative roles. An identity may hold zero, one, or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Pause/unpause, fee withdrawal, configuration updates.
    Admin,
    /// Dispute resolution only — arbitration does not imply admin rights.
    Arbitrator,
    /// Skill verification on the registry.
    Verifier,
    /// The escrow core's own identity, authorized to write reputation
    /// and earnings records into the registry.
    Escrow,
}

/// Explicit per-identity role grants. Authorization checks take the caller
/// identity as a parameter; there is no ambient "current user".
#[derive(Debug, Default)]
pub struct RoleSet {
    grants: DashMap<Uuid, HashSet<Role>>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self {
            grants: DashMap::new(),
        }
    }

    /// A role set whose initial admin is the given identity.
    pub fn with_admin(admin: Uuid) -> Self {
        let set = Self::new();
        set.grant(admin, Role::Admin);
        set
    }

    pub fn grant(&self, actor: Uuid, role: Role) {
        self.grants.entry(actor).or_default().insert(role);
    }

    pub fn revoke(&self, actor: Uuid, role: Role) {
        if let Some(mut roles) = self.grants.get_mut(&actor) {
            roles.remove(&role);
        }
    }

    pub fn has(&self, actor: Uuid, role: Role) -> bool {
        self.grants
            .get(&actor)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// Require the caller to hold a role; authorization failures are a
    /// distinct error class from domain errors.
    pub fn require(&self, actor: Uuid, role: Role) -> Result<()> {
        if self.has(actor, role) {
            Ok(())
        } else {
            Err(AgoraError::AccessDenied { actor, role })
        }
    }
}
