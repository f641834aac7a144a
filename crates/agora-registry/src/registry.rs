use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use agora_ledger::{EventLog, MarketEvent};
use agora_types::{
    AgentProfile, AgoraError, Amount, COMPLETION_REWARD, Clock, FAILURE_PENALTY, ReputationEvent,
    Result, Role, RoleSet, Skill, TaskId,
};

/// Key under which a skill is registered: sha256 over name and category.
pub fn skill_hash(name: &str, category: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(category.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Identity and reputation registry for worker agents.
///
/// The escrow core consults `is_active` before a claim and writes back
/// completion and earnings records; everything else here is agent-facing
/// profile management.
pub struct AgentRegistry {
    agents: DashMap<Uuid, AgentProfile>,
    skills: DashMap<Uuid, Vec<Skill>>,
    history: DashMap<Uuid, Vec<ReputationEvent>>,
    /// Registration order, for pagination.
    order: Mutex<Vec<Uuid>>,
    roles: RoleSet,
    events: EventLog,
    clock: Arc<dyn Clock>,
    paused: AtomicBool,
}

impl AgentRegistry {
    /// The deploying admin starts with both the `Admin` and `Verifier`
    /// roles, mirroring the reference deployment.
    pub fn new(admin: Uuid, clock: Arc<dyn Clock>) -> Self {
        let roles = RoleSet::with_admin(admin);
        roles.grant(admin, Role::Verifier);
        Self {
            agents: DashMap::new(),
            skills: DashMap::new(),
            history: DashMap::new(),
            order: Mutex::new(Vec::new()),
            roles,
            events: EventLog::new(),
            clock,
            paused: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn grant_role(&self, caller: Uuid, actor: Uuid, role: Role) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.roles.grant(actor, role);
        Ok(())
    }

    pub fn revoke_role(&self, caller: Uuid, actor: Uuid, role: Role) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.roles.revoke(actor, role);
        Ok(())
    }

    pub fn has_role(&self, actor: Uuid, role: Role) -> bool {
        self.roles.has(actor, role)
    }

    pub fn pause(&self, caller: Uuid) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn unpause(&self, caller: Uuid) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.is_paused() {
            Err(AgoraError::Paused)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Registration and profiles
    // ------------------------------------------------------------------

    pub fn register_agent(
        &self,
        caller: Uuid,
        public_key: &str,
        metadata_uri: &str,
    ) -> Result<AgentProfile> {
        self.ensure_not_paused()?;
        if public_key.is_empty() {
            return Err(AgoraError::InvalidPublicKey);
        }
        if metadata_uri.is_empty() {
            return Err(AgoraError::InvalidMetadata);
        }
        if self.agents.contains_key(&caller) {
            return Err(AgoraError::AlreadyRegistered(caller));
        }

        let profile = AgentProfile::new(caller, public_key, metadata_uri, self.clock.now());
        self.agents.insert(caller, profile.clone());
        self.order.lock().expect("order lock poisoned").push(caller);

        self.events.append(
            MarketEvent::AgentRegistered {
                agent: caller,
                public_key: public_key.to_string(),
                metadata_uri: metadata_uri.to_string(),
            },
            self.clock.now(),
        );
        tracing::info!(agent = %caller, "agent registered");
        Ok(profile)
    }

    pub fn update_agent(&self, caller: Uuid, public_key: &str, metadata_uri: &str) -> Result<()> {
        self.ensure_not_paused()?;
        if public_key.is_empty() {
            return Err(AgoraError::InvalidPublicKey);
        }
        if metadata_uri.is_empty() {
            return Err(AgoraError::InvalidMetadata);
        }
        let mut agent = self
            .agents
            .get_mut(&caller)
            .ok_or(AgoraError::AgentNotRegistered(caller))?;
        agent.public_key = public_key.to_string();
        agent.metadata_uri = metadata_uri.to_string();
        drop(agent);

        self.events.append(
            MarketEvent::AgentUpdated {
                agent: caller,
                public_key: public_key.to_string(),
                metadata_uri: metadata_uri.to_string(),
            },
            self.clock.now(),
        );
        Ok(())
    }

    pub fn deactivate_agent(&self, caller: Uuid) -> Result<()> {
        self.ensure_not_paused()?;
        let mut agent = self
            .agents
            .get_mut(&caller)
            .ok_or(AgoraError::AgentNotRegistered(caller))?;
        agent.is_active = false;
        drop(agent);
        self.events
            .append(MarketEvent::AgentDeactivated { agent: caller }, self.clock.now());
        Ok(())
    }

    pub fn reactivate_agent(&self, caller: Uuid) -> Result<()> {
        self.ensure_not_paused()?;
        let mut agent = self
            .agents
            .get_mut(&caller)
            .ok_or(AgoraError::AgentNotRegistered(caller))?;
        agent.is_active = true;
        drop(agent);
        self.events
            .append(MarketEvent::AgentReactivated { agent: caller }, self.clock.now());
        Ok(())
    }

    pub fn is_registered(&self, agent: Uuid) -> bool {
        self.agents.contains_key(&agent)
    }

    /// Registered and currently active — the precondition for claiming.
    pub fn is_active(&self, agent: Uuid) -> bool {
        self.agents
            .get(&agent)
            .map(|a| a.is_active)
            .unwrap_or(false)
    }

    pub fn get_agent(&self, agent: Uuid) -> Option<AgentProfile> {
        self.agents.get(&agent).map(|a| a.clone())
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Registered agent ids in registration order. Out-of-range pages are
    /// empty, partial tail pages are short.
    pub fn agents_by_page(&self, page: usize, page_size: usize) -> Vec<Uuid> {
        let order = self.order.lock().expect("order lock poisoned");
        let start = page.saturating_mul(page_size);
        if start >= order.len() {
            return Vec::new();
        }
        let end = (start + page_size).min(order.len());
        order[start..end].to_vec()
    }

    // ------------------------------------------------------------------
    // Reputation
    // ------------------------------------------------------------------

    /// Record a task outcome against an agent. Escrow-role callers only.
    pub fn record_completion(
        &self,
        caller: Uuid,
        agent: Uuid,
        task_ref: TaskId,
        success: bool,
    ) -> Result<()> {
        self.roles.require(caller, Role::Escrow)?;

        let (delta, reason) = if success {
            (COMPLETION_REWARD, "task completed")
        } else {
            (-FAILURE_PENALTY, "task failed")
        };

        let new_score = {
            let mut profile = self
                .agents
                .get_mut(&agent)
                .ok_or(AgoraError::AgentNotRegistered(agent))?;
            profile.apply_reputation_delta(delta);
            if success {
                profile.total_tasks_completed += 1;
            } else {
                profile.total_tasks_failed += 1;
            }
            profile.reputation_score
        };

        self.history.entry(agent).or_default().push(ReputationEvent {
            task_ref: Some(task_ref),
            delta,
            reason: reason.to_string(),
            at: self.clock.now(),
        });
        self.events.append(
            MarketEvent::ReputationChanged {
                agent,
                task_ref: Some(task_ref),
                delta,
                new_score,
            },
            self.clock.now(),
        );
        tracing::info!(agent = %agent, task = task_ref, delta, new_score, "completion recorded");
        Ok(())
    }

    /// Administrative override: apply an arbitrary signed delta.
    pub fn adjust_reputation(
        &self,
        caller: Uuid,
        agent: Uuid,
        delta: i64,
        reason: &str,
    ) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;

        let new_score = {
            let mut profile = self
                .agents
                .get_mut(&agent)
                .ok_or(AgoraError::AgentNotRegistered(agent))?;
            profile.apply_reputation_delta(delta);
            profile.reputation_score
        };

        self.history.entry(agent).or_default().push(ReputationEvent {
            task_ref: None,
            delta,
            reason: reason.to_string(),
            at: self.clock.now(),
        });
        self.events.append(
            MarketEvent::ReputationChanged {
                agent,
                task_ref: None,
                delta,
                new_score,
            },
            self.clock.now(),
        );
        Ok(())
    }

    pub fn get_reputation_history(&self, agent: Uuid) -> Vec<ReputationEvent> {
        self.history
            .get(&agent)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn get_reputation_percentage(&self, agent: Uuid) -> Option<u8> {
        self.agents
            .get(&agent)
            .map(|a| a.reputation_percentage())
    }

    /// Accumulate a worker payout into lifetime earnings. Escrow-role
    /// callers only.
    pub fn record_earnings(&self, caller: Uuid, agent: Uuid, amount: Amount) -> Result<()> {
        self.roles.require(caller, Role::Escrow)?;
        let total = {
            let mut profile = self
                .agents
                .get_mut(&agent)
                .ok_or(AgoraError::AgentNotRegistered(agent))?;
            profile.total_earnings += amount;
            profile.total_earnings
        };
        self.events.append(
            MarketEvent::EarningsRecorded {
                agent,
                amount,
                total_earnings: total,
            },
            self.clock.now(),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    pub fn add_skill(&self, caller: Uuid, name: &str, category: &str, level: u8) -> Result<String> {
        self.ensure_not_paused()?;
        if !self.agents.contains_key(&caller) {
            return Err(AgoraError::AgentNotRegistered(caller));
        }
        if !(1..=5).contains(&level) {
            return Err(AgoraError::InvalidSkillLevel(level));
        }

        let hash = skill_hash(name, category);
        let mut skills = self.skills.entry(caller).or_default();
        if skills.iter().any(|s| s.hash == hash) {
            return Err(AgoraError::SkillAlreadyAdded(hash));
        }
        skills.push(Skill {
            hash: hash.clone(),
            name: name.to_string(),
            category: category.to_string(),
            level,
            added_at: self.clock.now(),
            verified_at: None,
            verifier: None,
            proof_uri: None,
        });
        drop(skills);

        self.events.append(
            MarketEvent::SkillAdded {
                agent: caller,
                skill_hash: hash.clone(),
                name: name.to_string(),
                category: category.to_string(),
                level,
            },
            self.clock.now(),
        );
        Ok(hash)
    }

    /// Attest a skill on another agent's profile. Verifier-role callers
    /// only; self-verification is rejected regardless of role.
    pub fn verify_skill(
        &self,
        caller: Uuid,
        agent: Uuid,
        hash: &str,
        proof_uri: &str,
    ) -> Result<()> {
        self.ensure_not_paused()?;
        self.roles.require(caller, Role::Verifier)?;
        if caller == agent {
            return Err(AgoraError::CannotSelfVerify);
        }

        let mut skills = self
            .skills
            .get_mut(&agent)
            .ok_or_else(|| AgoraError::SkillNotFound(hash.to_string()))?;
        let skill = skills
            .iter_mut()
            .find(|s| s.hash == hash)
            .ok_or_else(|| AgoraError::SkillNotFound(hash.to_string()))?;
        skill.verified_at = Some(self.clock.now());
        skill.verifier = Some(caller);
        skill.proof_uri = Some(proof_uri.to_string());
        drop(skills);

        self.events.append(
            MarketEvent::SkillVerified {
                agent,
                skill_hash: hash.to_string(),
                verifier: caller,
                proof_uri: proof_uri.to_string(),
            },
            self.clock.now(),
        );
        Ok(())
    }

    pub fn get_agent_skills(&self, agent: Uuid) -> Vec<Skill> {
        self.skills.get(&agent).map(|s| s.clone()).unwrap_or_default()
    }

    pub fn get_skill(&self, agent: Uuid, hash: &str) -> Option<Skill> {
        self.skills
            .get(&agent)
            .and_then(|skills| skills.iter().find(|s| s.hash == hash).cloned())
    }

    pub fn has_skill(&self, agent: Uuid, name: &str, category: &str) -> bool {
        let hash = skill_hash(name, category);
        self.skills
            .get(&agent)
            .map(|skills| skills.iter().any(|s| s.hash == hash))
            .unwrap_or(false)
    }

    /// The registry's own event stream, for off-chain indexers to drain.
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}
