use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use agora_ledger::{EventLog, MarketEvent};
use agora_registry::AgentRegistry;
use agora_token::TokenLedger;
use agora_types::{
    AgoraError, Amount, Clock, Dispute, DisputeId, DisputeResolution, Result, Role, RoleSet, Task,
    TaskAction, TaskId, TaskStatus, percentage_of,
};

use crate::policy::EscrowPolicy;

/// The escrow core: task arena, fund custody, dispute gateway and fee
/// accounting.
///
/// Every state-mutating call takes the caller identity explicitly and is
/// atomic: it validates, then mutates, then settles. Funding pulls run
/// before any state is written so a failed pull leaves no trace; payout
/// pushes run after the status change so a malicious recipient re-entering
/// through the token ledger can only observe post-transition state.
///
/// Deployment wiring: the engine settles through its own custody account
/// (`account()`), which must be granted the `Escrow` role on the registry
/// before the first approval, and which payers must `approve` on the token
/// ledger before creating or claiming tasks.
pub struct EscrowEngine {
    tasks: Vec<Task>,
    disputes: Vec<Dispute>,
    creator_tasks: HashMap<Uuid, Vec<TaskId>>,
    worker_tasks: HashMap<Uuid, Vec<TaskId>>,
    token: Arc<dyn TokenLedger>,
    registry: Arc<AgentRegistry>,
    roles: RoleSet,
    /// Custody account on the token ledger; all locked value sits here.
    account: Uuid,
    policy: EscrowPolicy,
    total_fees_collected: Amount,
    paused: bool,
    events: EventLog,
    clock: Arc<dyn Clock>,
}

impl EscrowEngine {
    pub fn new(
        admin: Uuid,
        token: Arc<dyn TokenLedger>,
        registry: Arc<AgentRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_policy(admin, token, registry, clock, EscrowPolicy::default())
    }

    pub fn with_policy(
        admin: Uuid,
        token: Arc<dyn TokenLedger>,
        registry: Arc<AgentRegistry>,
        clock: Arc<dyn Clock>,
        policy: EscrowPolicy,
    ) -> Self {
        Self {
            tasks: Vec::new(),
            disputes: Vec::new(),
            creator_tasks: HashMap::new(),
            worker_tasks: HashMap::new(),
            token,
            registry,
            roles: RoleSet::with_admin(admin),
            account: Uuid::new_v4(),
            policy,
            total_fees_collected: 0,
            paused: false,
            events: EventLog::new(),
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn account(&self) -> Uuid {
        self.account
    }

    pub fn auto_approve_period(&self) -> Duration {
        self.policy.auto_approve_period()
    }

    pub fn worker_stake_percentage(&self) -> u32 {
        self.policy.worker_stake_percentage
    }

    pub fn platform_fee_percentage(&self) -> u32 {
        self.policy.platform_fee_percentage
    }

    pub fn total_fees_collected(&self) -> Amount {
        self.total_fees_collected
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn get_task(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .get(id as usize)
            .ok_or(AgoraError::TaskNotFound(id))
    }

    pub fn get_dispute(&self, id: DisputeId) -> Result<&Dispute> {
        self.disputes
            .get(id as usize)
            .ok_or(AgoraError::DisputeNotFound(id))
    }

    pub fn get_creator_tasks(&self, creator: Uuid) -> Vec<TaskId> {
        self.creator_tasks.get(&creator).cloned().unwrap_or_default()
    }

    pub fn get_worker_tasks(&self, worker: Uuid) -> Vec<TaskId> {
        self.worker_tasks.get(&worker).cloned().unwrap_or_default()
    }

    /// Task ids currently in `Submitted`, for the auto-approve keeper.
    pub fn submitted_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Submitted)
            .map(|t| t.id)
            .collect()
    }

    /// Value locked for all non-terminal tasks. By the custody invariant
    /// this always equals the escrow account's task-attributable balance.
    pub fn total_locked(&self) -> Amount {
        self.tasks.iter().map(|t| t.locked_value()).sum()
    }

    /// The escrow's event stream, for off-chain indexers to drain.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn grant_role(&mut self, caller: Uuid, actor: Uuid, role: Role) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.roles.grant(actor, role);
        Ok(())
    }

    pub fn revoke_role(&mut self, caller: Uuid, actor: Uuid, role: Role) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.roles.revoke(actor, role);
        Ok(())
    }

    pub fn pause(&mut self, caller: Uuid) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.paused = true;
        tracing::warn!("escrow paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: Uuid) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.paused = false;
        tracing::info!("escrow unpaused");
        Ok(())
    }

    /// Swap the settlement-token ledger. Applies to subsequent operations;
    /// in-flight tasks are not migrated.
    pub fn set_token(&mut self, caller: Uuid, token: Arc<dyn TokenLedger>) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.token = token;
        Ok(())
    }

    /// Swap the agent registry. Applies to subsequent operations.
    pub fn set_registry(&mut self, caller: Uuid, registry: Arc<AgentRegistry>) -> Result<()> {
        self.roles.require(caller, Role::Admin)?;
        self.registry = registry;
        Ok(())
    }

    /// Transfer the accrued platform fees to the calling admin and reset
    /// the running total.
    pub fn withdraw_fees(&mut self, caller: Uuid) -> Result<Amount> {
        self.roles.require(caller, Role::Admin)?;
        let amount = self.total_fees_collected;
        self.total_fees_collected = 0;
        self.token.transfer(self.account, caller, amount)?;
        self.events.append(
            MarketEvent::FeesWithdrawn {
                recipient: caller,
                amount,
            },
            self.clock.now(),
        );
        tracing::info!(recipient = %caller, amount, "fees withdrawn");
        Ok(amount)
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            Err(AgoraError::Paused)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Task lifecycle
    // ------------------------------------------------------------------

    /// Lock a bounty and open a task. The caller becomes its creator.
    pub fn create_task(
        &mut self,
        caller: Uuid,
        bounty: Amount,
        metadata_uri: &str,
    ) -> Result<TaskId> {
        self.ensure_not_paused()?;
        if bounty == 0 {
            return Err(AgoraError::InvalidBounty);
        }
        if metadata_uri.is_empty() {
            return Err(AgoraError::InvalidMetadata);
        }

        // Pull the bounty into custody before any state is written.
        self.token
            .transfer_from(self.account, caller, self.account, bounty)?;

        let id = self.tasks.len() as TaskId;
        let task = Task::new(id, caller, bounty, metadata_uri, self.clock.now());
        self.tasks.push(task);
        self.creator_tasks.entry(caller).or_default().push(id);

        self.events.append(
            MarketEvent::TaskCreated {
                task_id: id,
                creator: caller,
                bounty,
                metadata_uri: metadata_uri.to_string(),
            },
            self.clock.now(),
        );
        tracing::info!(task = id, creator = %caller, bounty, "task created");
        Ok(id)
    }

    /// Stake collateral and claim an open task. The caller becomes its
    /// worker and must be a registered, active agent.
    pub fn claim_task(&mut self, caller: Uuid, id: TaskId) -> Result<()> {
        self.ensure_not_paused()?;
        if !self.registry.is_active(caller) {
            return Err(AgoraError::AgentNotRegistered(caller));
        }

        let task = self.get_task(id)?;
        let next = task.status.transition(TaskAction::Claim)?;
        let stake = percentage_of(task.bounty, self.policy.worker_stake_percentage);

        // Pull the stake before any state is written.
        self.token
            .transfer_from(self.account, caller, self.account, stake)?;

        let task = &mut self.tasks[id as usize];
        task.status = next;
        task.worker = Some(caller);
        task.worker_stake = stake;
        self.worker_tasks.entry(caller).or_default().push(id);

        self.events.append(
            MarketEvent::TaskClaimed {
                task_id: id,
                worker: caller,
                stake,
            },
            self.clock.now(),
        );
        tracing::info!(task = id, worker = %caller, stake, "task claimed");
        Ok(())
    }

    /// Record the completion artifact. Worker only, from `Claimed`.
    pub fn submit_work(&mut self, caller: Uuid, id: TaskId, submission_uri: &str) -> Result<()> {
        self.ensure_not_paused()?;

        let task = self.get_task(id)?;
        let next = task.status.transition(TaskAction::Submit)?;
        if task.worker != Some(caller) {
            return Err(AgoraError::NotTaskWorker);
        }
        if submission_uri.is_empty() {
            return Err(AgoraError::InvalidMetadata);
        }

        let now = self.clock.now();
        let task = &mut self.tasks[id as usize];
        task.status = next;
        task.submission_uri = submission_uri.to_string();
        task.submitted_at = Some(now);

        self.events.append(
            MarketEvent::WorkSubmitted {
                task_id: id,
                worker: caller,
                submission_uri: submission_uri.to_string(),
            },
            now,
        );
        tracing::info!(task = id, worker = %caller, "work submitted");
        Ok(())
    }

    /// Creator approval, valid strictly before the auto-approve deadline.
    pub fn approve_work(&mut self, caller: Uuid, id: TaskId) -> Result<()> {
        self.ensure_not_paused()?;

        let task = self.get_task(id)?;
        let next = task.status.transition(TaskAction::Approve)?;
        if task.creator != caller {
            return Err(AgoraError::NotTaskCreator);
        }
        if self.clock.now() >= self.deadline(task)? {
            return Err(AgoraError::AutoApprovePeriodPassed);
        }

        self.settle_approval(id, next, Some(caller))
    }

    /// Permissionless approval at or after the deadline. Anyone may call:
    /// no single party can block payment indefinitely by withholding
    /// approval.
    pub fn auto_approve_work(&mut self, caller: Uuid, id: TaskId) -> Result<()> {
        self.ensure_not_paused()?;

        let task = self.get_task(id)?;
        let next = task.status.transition(TaskAction::AutoApprove)?;
        if self.clock.now() < self.deadline(task)? {
            return Err(AgoraError::AutoApprovePeriodNotReached);
        }

        tracing::info!(task = id, keeper = %caller, "auto-approving");
        self.settle_approval(id, next, None)
    }

    /// Shared payout for both approval paths:
    /// `fee = bounty * fee% / 100`, `payout = bounty + stake - fee`.
    /// The fee comes out of the bounty only — the stake returns whole.
    fn settle_approval(
        &mut self,
        id: TaskId,
        next: TaskStatus,
        approver: Option<Uuid>,
    ) -> Result<()> {
        // The registry write must be authorized before any effect lands.
        self.require_registry_authority()?;

        let task = &self.tasks[id as usize];
        let worker = task.worker.ok_or(AgoraError::NotTaskWorker)?;
        let fee = percentage_of(task.bounty, self.policy.platform_fee_percentage);
        let payout = task.bounty + task.worker_stake - fee;

        let task = &mut self.tasks[id as usize];
        task.status = next;
        task.creator_approved = approver.is_some();
        task.auto_approved = approver.is_none();
        self.total_fees_collected += fee;

        self.token.transfer(self.account, worker, payout)?;
        self.registry
            .record_completion(self.account, worker, id, true)?;
        self.registry.record_earnings(self.account, worker, payout)?;

        self.events.append(
            MarketEvent::WorkApproved {
                task_id: id,
                approver,
                auto_approved: approver.is_none(),
            },
            self.clock.now(),
        );
        tracing::info!(task = id, worker = %worker, payout, fee, "work approved");
        Ok(())
    }

    /// Whether the task is eligible for `auto_approve_work` right now.
    pub fn can_auto_approve(&self, id: TaskId) -> Result<bool> {
        let task = self.get_task(id)?;
        match task.submitted_at {
            Some(at) if task.status == TaskStatus::Submitted => {
                Ok(self.clock.now() >= at + self.policy.auto_approve_period())
            }
            _ => Ok(false),
        }
    }

    /// Time remaining in the review window; zero once the deadline has
    /// passed.
    pub fn time_until_auto_approve(&self, id: TaskId) -> Result<Duration> {
        let task = self.get_task(id)?;
        let deadline = self.deadline(task)?;
        let now = self.clock.now();
        if now >= deadline {
            Ok(Duration::zero())
        } else {
            Ok(deadline - now)
        }
    }

    /// Contest a submission. Creator or worker only, within the review
    /// window — once auto-approval is eligible the dispute window is shut.
    pub fn open_dispute(&mut self, caller: Uuid, id: TaskId, reason: &str) -> Result<DisputeId> {
        self.ensure_not_paused()?;

        let task = self.get_task(id)?;
        if caller != task.creator && task.worker != Some(caller) {
            return Err(AgoraError::NotTaskParticipant);
        }
        if let Some(existing) = task.dispute_id {
            return Err(AgoraError::DisputeAlreadyExists(existing));
        }
        let next = task.status.transition(TaskAction::Dispute)?;
        if self.clock.now() >= self.deadline(task)? {
            return Err(AgoraError::AutoApprovePeriodPassed);
        }

        let dispute_id = self.disputes.len() as DisputeId;
        let now = self.clock.now();
        self.disputes
            .push(Dispute::new(dispute_id, id, caller, reason, now));

        let task = &mut self.tasks[id as usize];
        task.status = next;
        task.dispute_id = Some(dispute_id);

        self.events.append(
            MarketEvent::DisputeOpened {
                task_id: id,
                dispute_id,
                opened_by: caller,
                reason: reason.to_string(),
            },
            now,
        );
        tracing::info!(task = id, dispute = dispute_id, opener = %caller, "dispute opened");
        Ok(dispute_id)
    }

    /// Arbitrator ruling. The winner must be the task's creator or worker.
    ///
    /// Worker wins: full restitution (`bounty + stake`), fee-free, and a
    /// completion credit. Creator wins: the bounty returns, the stake is
    /// slashed into the fee pool, and the worker takes a failure mark.
    pub fn resolve_dispute(
        &mut self,
        caller: Uuid,
        id: TaskId,
        winner: Uuid,
        note: &str,
    ) -> Result<()> {
        self.ensure_not_paused()?;
        self.roles.require(caller, Role::Arbitrator)?;
        self.require_registry_authority()?;

        let task = self.get_task(id)?;
        let next = task.status.transition(TaskAction::Resolve)?;
        let worker = task.worker.ok_or(AgoraError::NotTaskWorker)?;
        if winner != task.creator && winner != worker {
            return Err(AgoraError::InvalidResolution(winner));
        }
        let dispute_id = task.dispute_id.ok_or(AgoraError::TaskNotDisputed {
            status: task.status,
        })?;

        let bounty = task.bounty;
        let stake = task.worker_stake;
        let creator = task.creator;
        let worker_wins = winner == worker;
        let now = self.clock.now();

        let task = &mut self.tasks[id as usize];
        task.status = next;
        if !worker_wins {
            // Slashed stake accrues to the platform, not the creator.
            self.total_fees_collected += stake;
        }
        self.disputes[dispute_id as usize].resolution = Some(DisputeResolution {
            winner,
            note: note.to_string(),
            resolved_at: now,
        });

        if worker_wins {
            let restitution = bounty + stake;
            self.token.transfer(self.account, worker, restitution)?;
            self.registry
                .record_completion(self.account, worker, id, true)?;
            self.registry
                .record_earnings(self.account, worker, restitution)?;
        } else {
            self.token.transfer(self.account, creator, bounty)?;
            self.registry
                .record_completion(self.account, worker, id, false)?;
        }

        self.events.append(
            MarketEvent::DisputeResolved {
                task_id: id,
                dispute_id,
                winner,
                note: note.to_string(),
            },
            now,
        );
        tracing::info!(task = id, dispute = dispute_id, winner = %winner, "dispute resolved");
        Ok(())
    }

    /// Refund an unclaimed task. Creator only, before any stake is
    /// committed.
    pub fn cancel_task(&mut self, caller: Uuid, id: TaskId) -> Result<()> {
        self.ensure_not_paused()?;

        let task = self.get_task(id)?;
        if task.creator != caller {
            return Err(AgoraError::NotTaskCreator);
        }
        let next = task.status.transition(TaskAction::Cancel)?;
        let bounty = task.bounty;

        let task = &mut self.tasks[id as usize];
        task.status = next;

        self.token.transfer(self.account, caller, bounty)?;

        self.events.append(
            MarketEvent::TaskCancelled {
                task_id: id,
                creator: caller,
            },
            self.clock.now(),
        );
        tracing::info!(task = id, creator = %caller, bounty, "task cancelled");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn deadline(&self, task: &Task) -> Result<DateTime<Utc>> {
        let submitted_at = task.submitted_at.ok_or(AgoraError::TaskNotSubmitted {
            status: task.status,
        })?;
        Ok(submitted_at + self.policy.auto_approve_period())
    }

    /// Settlement writes reputation and earnings into the registry; verify
    /// the wiring up-front so a misconfigured deployment fails before any
    /// funds or state move.
    fn require_registry_authority(&self) -> Result<()> {
        if self.registry.has_role(self.account, Role::Escrow) {
            Ok(())
        } else {
            Err(AgoraError::AccessDenied {
                actor: self.account,
                role: Role::Escrow,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_token::InMemoryToken;
    use agora_types::ManualClock;
    use chrono::Utc;

    const BOUNTY: Amount = 1000;

    struct Harness {
        engine: EscrowEngine,
        token: Arc<InMemoryToken>,
        registry: Arc<AgentRegistry>,
        clock: Arc<ManualClock>,
        admin: Uuid,
        creator: Uuid,
        worker: Uuid,
        arbitrator: Uuid,
    }

    fn harness() -> Harness {
        let admin = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let arbitrator = Uuid::new_v4();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let token = Arc::new(InMemoryToken::new());
        let registry = Arc::new(AgentRegistry::new(admin, clock.clone()));
        let mut engine = EscrowEngine::new(
            admin,
            token.clone(),
            registry.clone(),
            clock.clone(),
        );

        engine.grant_role(admin, arbitrator, Role::Arbitrator).unwrap();
        registry
            .grant_role(admin, engine.account(), Role::Escrow)
            .unwrap();
        registry
            .register_agent(worker, "worker-key", "ipfs://worker")
            .unwrap();

        token.mint(creator, 10_000);
        token.mint(worker, 5_000);
        token.approve(creator, engine.account(), Amount::MAX);
        token.approve(worker, engine.account(), Amount::MAX);

        Harness {
            engine,
            token,
            registry,
            clock,
            admin,
            creator,
            worker,
            arbitrator,
        }
    }

    fn submitted_task(h: &mut Harness) -> TaskId {
        let id = h.engine.create_task(h.creator, BOUNTY, "ipfs://meta").unwrap();
        h.engine.claim_task(h.worker, id).unwrap();
        h.engine.submit_work(h.worker, id, "ipfs://result").unwrap();
        id
    }

    #[test]
    fn test_create_task_locks_bounty() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "ipfs://meta").unwrap();

        let task = h.engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.creator, h.creator);
        assert_eq!(h.token.balance_of(h.creator), 9_000);
        assert_eq!(h.token.balance_of(h.engine.account()), BOUNTY);
        assert_eq!(h.engine.get_creator_tasks(h.creator), vec![id]);
    }

    #[test]
    fn test_create_task_validations() {
        let mut h = harness();
        assert_eq!(
            h.engine.create_task(h.creator, 0, "meta").unwrap_err(),
            AgoraError::InvalidBounty
        );
        assert_eq!(
            h.engine.create_task(h.creator, BOUNTY, "").unwrap_err(),
            AgoraError::InvalidMetadata
        );
    }

    #[test]
    fn test_create_task_without_allowance_fails_cleanly() {
        let mut h = harness();
        let stranger = Uuid::new_v4();
        h.token.mint(stranger, 5_000);

        let err = h.engine.create_task(stranger, BOUNTY, "meta").unwrap_err();
        assert!(matches!(err, AgoraError::InsufficientAllowance { .. }));
        assert_eq!(h.engine.task_count(), 0);
        assert_eq!(h.token.balance_of(stranger), 5_000);
    }

    #[test]
    fn test_claim_requires_registration() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();

        let err = h.engine.claim_task(h.creator, id).unwrap_err();
        assert_eq!(err, AgoraError::AgentNotRegistered(h.creator));
    }

    #[test]
    fn test_claim_locks_ten_percent_stake() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
        h.engine.claim_task(h.worker, id).unwrap();

        let task = h.engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.worker, Some(h.worker));
        assert_eq!(task.worker_stake, 100);
        assert_eq!(h.token.balance_of(h.worker), 4_900);
        assert_eq!(h.engine.get_worker_tasks(h.worker), vec![id]);
    }

    #[test]
    fn test_second_claim_sees_updated_status() {
        let mut h = harness();
        let other = Uuid::new_v4();
        h.registry
            .register_agent(other, "other-key", "ipfs://other")
            .unwrap();
        h.token.mint(other, 1_000);
        h.token.approve(other, h.engine.account(), Amount::MAX);

        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
        h.engine.claim_task(h.worker, id).unwrap();

        let err = h.engine.claim_task(other, id).unwrap_err();
        assert_eq!(
            err,
            AgoraError::TaskNotOpen {
                status: TaskStatus::Claimed
            }
        );
        assert_eq!(h.token.balance_of(other), 1_000);
    }

    #[test]
    fn test_deactivated_agent_cannot_claim() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
        h.registry.deactivate_agent(h.worker).unwrap();

        let err = h.engine.claim_task(h.worker, id).unwrap_err();
        assert_eq!(err, AgoraError::AgentNotRegistered(h.worker));
    }

    #[test]
    fn test_submit_work_guards() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();

        // Not yet claimed.
        assert_eq!(
            h.engine.submit_work(h.worker, id, "uri").unwrap_err(),
            AgoraError::TaskNotClaimed {
                status: TaskStatus::Open
            }
        );

        h.engine.claim_task(h.worker, id).unwrap();

        // Wrong caller.
        assert_eq!(
            h.engine.submit_work(h.creator, id, "uri").unwrap_err(),
            AgoraError::NotTaskWorker
        );
        // Empty submission.
        assert_eq!(
            h.engine.submit_work(h.worker, id, "").unwrap_err(),
            AgoraError::InvalidMetadata
        );

        h.engine.submit_work(h.worker, id, "ipfs://result").unwrap();
        let task = h.engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Submitted);
        assert_eq!(task.submission_uri, "ipfs://result");
        assert!(task.submitted_at.is_some());
    }

    #[test]
    fn test_approve_pays_bounty_plus_stake_minus_fee() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        let before = h.token.balance_of(h.worker);
        h.engine.approve_work(h.creator, id).unwrap();

        // 1000 + 100 - 20
        assert_eq!(h.token.balance_of(h.worker) - before, 1_080);
        assert_eq!(h.engine.total_fees_collected(), 20);

        let task = h.engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Approved);
        assert!(task.creator_approved);
        assert!(!task.auto_approved);
    }

    #[test]
    fn test_approve_requires_creator() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        assert_eq!(
            h.engine.approve_work(h.worker, id).unwrap_err(),
            AgoraError::NotTaskCreator
        );
    }

    #[test]
    fn test_double_approve_pays_once() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        h.engine.approve_work(h.creator, id).unwrap();
        let balance = h.token.balance_of(h.worker);

        assert_eq!(
            h.engine.approve_work(h.creator, id).unwrap_err(),
            AgoraError::TaskNotSubmitted {
                status: TaskStatus::Approved
            }
        );
        assert_eq!(h.token.balance_of(h.worker), balance);
        assert_eq!(h.engine.total_fees_collected(), 20);
    }

    #[test]
    fn test_approve_window_boundaries() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        // One second before the deadline: still the creator's window.
        h.clock.advance(Duration::hours(48) - Duration::seconds(1));
        assert!(!h.engine.can_auto_approve(id).unwrap());
        assert_eq!(
            h.engine.auto_approve_work(h.worker, id).unwrap_err(),
            AgoraError::AutoApprovePeriodNotReached
        );
        h.engine.approve_work(h.creator, id).unwrap();
    }

    #[test]
    fn test_approve_rejected_after_deadline() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        h.clock.advance(Duration::hours(48) + Duration::seconds(1));
        assert_eq!(
            h.engine.approve_work(h.creator, id).unwrap_err(),
            AgoraError::AutoApprovePeriodPassed
        );

        // The mirror: anyone may now auto-approve.
        let keeper = Uuid::new_v4();
        h.engine.auto_approve_work(keeper, id).unwrap();
        let task = h.engine.get_task(id).unwrap();
        assert!(task.auto_approved);
        assert!(!task.creator_approved);
        assert_eq!(h.engine.total_fees_collected(), 20);
    }

    #[test]
    fn test_auto_approve_exactly_at_deadline() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        h.clock.advance(Duration::hours(48));
        assert!(h.engine.can_auto_approve(id).unwrap());
        // Approve is strictly-before; at the boundary it has already passed.
        assert_eq!(
            h.engine.approve_work(h.creator, id).unwrap_err(),
            AgoraError::AutoApprovePeriodPassed
        );
        h.engine.auto_approve_work(h.creator, id).unwrap();
    }

    #[test]
    fn test_time_until_auto_approve() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        assert_eq!(
            h.engine.time_until_auto_approve(id).unwrap(),
            Duration::hours(48)
        );
        h.clock.advance(Duration::hours(24));
        assert_eq!(
            h.engine.time_until_auto_approve(id).unwrap(),
            Duration::hours(24)
        );
        h.clock.advance(Duration::hours(25));
        assert_eq!(h.engine.time_until_auto_approve(id).unwrap(), Duration::zero());
    }

    #[test]
    fn test_open_dispute_participants_only() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        let outsider = Uuid::new_v4();
        assert_eq!(
            h.engine.open_dispute(outsider, id, "reason").unwrap_err(),
            AgoraError::NotTaskParticipant
        );

        let dispute_id = h.engine.open_dispute(h.creator, id, "quality issues").unwrap();
        assert_eq!(dispute_id, 0);
        let task = h.engine.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Disputed);
        assert_eq!(task.dispute_id, Some(0));
    }

    #[test]
    fn test_worker_may_open_dispute() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine
            .open_dispute(h.worker, id, "creator not responding")
            .unwrap();
        assert_eq!(h.engine.get_dispute(0).unwrap().opened_by, h.worker);
    }

    #[test]
    fn test_second_dispute_rejected() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.open_dispute(h.creator, id, "reason 1").unwrap();

        assert_eq!(
            h.engine.open_dispute(h.worker, id, "reason 2").unwrap_err(),
            AgoraError::DisputeAlreadyExists(0)
        );
    }

    #[test]
    fn test_dispute_window_closes_with_auto_approval() {
        let mut h = harness();
        let id = submitted_task(&mut h);

        h.clock.advance(Duration::hours(48) + Duration::seconds(1));
        assert_eq!(
            h.engine.open_dispute(h.creator, id, "too late").unwrap_err(),
            AgoraError::AutoApprovePeriodPassed
        );
    }

    #[test]
    fn test_resolve_requires_arbitrator_role() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.open_dispute(h.creator, id, "reason").unwrap();

        let err = h
            .engine
            .resolve_dispute(h.creator, id, h.worker, "note")
            .unwrap_err();
        assert!(matches!(err, AgoraError::AccessDenied { .. }));
    }

    #[test]
    fn test_resolve_worker_wins_full_restitution() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.open_dispute(h.creator, id, "reason").unwrap();

        let before = h.token.balance_of(h.worker);
        h.engine
            .resolve_dispute(h.arbitrator, id, h.worker, "work acceptable")
            .unwrap();

        // 1000 + 100, fee-free.
        assert_eq!(h.token.balance_of(h.worker) - before, 1_100);
        assert_eq!(h.engine.total_fees_collected(), 0);
        assert_eq!(h.engine.get_task(id).unwrap().status, TaskStatus::Resolved);
        assert!(h.engine.get_dispute(0).unwrap().is_resolved());

        let profile = h.registry.get_agent(h.worker).unwrap();
        assert_eq!(profile.total_tasks_completed, 1);
    }

    #[test]
    fn test_resolve_creator_wins_slashes_stake() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.open_dispute(h.creator, id, "reason").unwrap();

        let creator_before = h.token.balance_of(h.creator);
        let worker_before = h.token.balance_of(h.worker);
        h.engine
            .resolve_dispute(h.arbitrator, id, h.creator, "work rejected")
            .unwrap();

        // Bounty only; the slashed stake lands in the fee pool.
        assert_eq!(h.token.balance_of(h.creator) - creator_before, BOUNTY);
        assert_eq!(h.token.balance_of(h.worker), worker_before);
        assert_eq!(h.engine.total_fees_collected(), 100);

        let profile = h.registry.get_agent(h.worker).unwrap();
        assert_eq!(profile.total_tasks_failed, 1);
        assert_eq!(profile.reputation_score, 5000 - 200);
    }

    #[test]
    fn test_resolve_rejects_third_party_winner() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.open_dispute(h.creator, id, "reason").unwrap();

        let outsider = Uuid::new_v4();
        assert_eq!(
            h.engine
                .resolve_dispute(h.arbitrator, id, outsider, "invalid")
                .unwrap_err(),
            AgoraError::InvalidResolution(outsider)
        );
    }

    #[test]
    fn test_cancel_refunds_full_bounty() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();

        let before = h.token.balance_of(h.creator);
        h.engine.cancel_task(h.creator, id).unwrap();

        assert_eq!(h.token.balance_of(h.creator) - before, BOUNTY);
        assert_eq!(h.engine.get_task(id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_cancel_guards() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();

        assert_eq!(
            h.engine.cancel_task(h.worker, id).unwrap_err(),
            AgoraError::NotTaskCreator
        );

        h.engine.claim_task(h.worker, id).unwrap();
        assert_eq!(
            h.engine.cancel_task(h.creator, id).unwrap_err(),
            AgoraError::CannotCancelClaimedTask {
                status: TaskStatus::Claimed
            }
        );
    }

    #[test]
    fn test_pause_blocks_mutations_reads_stay() {
        let mut h = harness();
        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();

        h.engine.pause(h.admin).unwrap();
        assert_eq!(
            h.engine.create_task(h.creator, BOUNTY, "meta").unwrap_err(),
            AgoraError::Paused
        );
        assert_eq!(
            h.engine.claim_task(h.worker, id).unwrap_err(),
            AgoraError::Paused
        );
        // Reads remain available.
        assert_eq!(h.engine.get_task(id).unwrap().status, TaskStatus::Open);

        h.engine.unpause(h.admin).unwrap();
        h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
    }

    #[test]
    fn test_pause_requires_admin() {
        let mut h = harness();
        let err = h.engine.pause(h.creator).unwrap_err();
        assert!(matches!(err, AgoraError::AccessDenied { .. }));
    }

    #[test]
    fn test_withdraw_fees_resets_total() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.approve_work(h.creator, id).unwrap();
        assert_eq!(h.engine.total_fees_collected(), 20);

        let before = h.token.balance_of(h.admin);
        let withdrawn = h.engine.withdraw_fees(h.admin).unwrap();
        assert_eq!(withdrawn, 20);
        assert_eq!(h.token.balance_of(h.admin) - before, 20);
        assert_eq!(h.engine.total_fees_collected(), 0);
    }

    #[test]
    fn test_withdraw_fees_requires_admin() {
        let mut h = harness();
        let err = h.engine.withdraw_fees(h.creator).unwrap_err();
        assert!(matches!(err, AgoraError::AccessDenied { .. }));
    }

    #[test]
    fn test_arbitrator_is_not_admin() {
        let mut h = harness();
        assert!(h.engine.pause(h.arbitrator).is_err());
        assert!(h.engine.withdraw_fees(h.arbitrator).is_err());
    }

    #[test]
    fn test_set_token_swaps_ledger_for_new_tasks() {
        let mut h = harness();
        let new_token = Arc::new(InMemoryToken::new());
        new_token.mint(h.creator, 2_000);
        new_token.approve(h.creator, h.engine.account(), Amount::MAX);

        h.engine.set_token(h.admin, new_token.clone()).unwrap();
        h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
        assert_eq!(new_token.balance_of(h.engine.account()), BOUNTY);
    }

    #[test]
    fn test_truncation_in_stake_and_fee() {
        let mut h = harness();
        // 999 * 10 / 100 = 99 (truncated), 999 * 2 / 100 = 19 (truncated).
        let id = h.engine.create_task(h.creator, 999, "meta").unwrap();
        h.engine.claim_task(h.worker, id).unwrap();
        assert_eq!(h.engine.get_task(id).unwrap().worker_stake, 99);

        h.engine.submit_work(h.worker, id, "uri").unwrap();
        let before = h.token.balance_of(h.worker);
        h.engine.approve_work(h.creator, id).unwrap();
        assert_eq!(h.token.balance_of(h.worker) - before, 999 + 99 - 19);
        assert_eq!(h.engine.total_fees_collected(), 19);
    }

    #[test]
    fn test_registered_creator_may_claim_own_task() {
        let mut h = harness();
        h.registry
            .register_agent(h.creator, "creator-key", "ipfs://creator")
            .unwrap();

        let id = h.engine.create_task(h.creator, BOUNTY, "meta").unwrap();
        h.engine.claim_task(h.creator, id).unwrap();
        assert_eq!(h.engine.get_task(id).unwrap().worker, Some(h.creator));
    }

    #[test]
    fn test_events_emitted_along_lifecycle() {
        let mut h = harness();
        let id = submitted_task(&mut h);
        h.engine.approve_work(h.creator, id).unwrap();

        let records = h.engine.events().drain();
        let kinds: Vec<_> = records.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                agora_ledger::EventKind::TaskCreated,
                agora_ledger::EventKind::TaskClaimed,
                agora_ledger::EventKind::WorkSubmitted,
                agora_ledger::EventKind::WorkApproved,
            ]
        );
        assert!(h.engine.events().is_empty());
    }
}
