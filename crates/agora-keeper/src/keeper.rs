use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use agora_escrow::EscrowEngine;
use agora_types::TaskId;

/// Events emitted by the keeper loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeeperEvent {
    TaskAutoApproved { task_id: TaskId },
    SweepCompleted { checked: usize, approved: usize },
}

/// Configuration for the keeper loop.
pub struct KeeperConfig {
    /// How often to scan submitted tasks for elapsed review windows.
    pub sweep_interval: std::time::Duration,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}

/// The auto-approve keeper.
///
/// Auto-approval is permissionless by design: once a review window
/// elapses, anyone may trigger payout, so a creator cannot starve a worker
/// by going silent. This loop is that "anyone" — it periodically sweeps
/// submitted tasks and approves every one whose window has lapsed.
pub struct Keeper {
    engine: Arc<Mutex<EscrowEngine>>,
    event_tx: mpsc::Sender<KeeperEvent>,
    shutdown_rx: watch::Receiver<bool>,
    config: KeeperConfig,
    /// The identity the keeper calls with; holds no roles.
    identity: Uuid,
}

impl Keeper {
    pub fn new(
        engine: Arc<Mutex<EscrowEngine>>,
        event_tx: mpsc::Sender<KeeperEvent>,
        shutdown_rx: watch::Receiver<bool>,
        config: KeeperConfig,
    ) -> Self {
        Self {
            engine,
            event_tx,
            shutdown_rx,
            config,
            identity: Uuid::new_v4(),
        }
    }

    /// Run the keeper until shutdown is signalled.
    pub async fn run(mut self) {
        let mut sweep_interval = tokio::time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    self.sweep().await;
                }
                Ok(()) = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("Keeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over submitted tasks. Individual failures are logged and
    /// skipped; they never stop the sweep.
    pub async fn sweep(&self) -> usize {
        let (checked, approved) = {
            let mut engine = self.engine.lock().await;
            let candidates = engine.submitted_tasks();
            let checked = candidates.len();
            let mut approved = Vec::new();

            for task_id in candidates {
                match engine.can_auto_approve(task_id) {
                    Ok(true) => match engine.auto_approve_work(self.identity, task_id) {
                        Ok(()) => approved.push(task_id),
                        Err(e) => {
                            tracing::warn!(task = task_id, error = %e, "auto-approval failed");
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(task = task_id, error = %e, "eligibility check failed");
                    }
                }
            }
            (checked, approved)
        };

        // Events go out after the engine lock is released.
        for task_id in &approved {
            let _ = self
                .event_tx
                .send(KeeperEvent::TaskAutoApproved { task_id: *task_id })
                .await;
        }
        let _ = self
            .event_tx
            .send(KeeperEvent::SweepCompleted {
                checked,
                approved: approved.len(),
            })
            .await;

        approved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_registry::AgentRegistry;
    use agora_token::{InMemoryToken, TokenLedger};
    use agora_types::{Amount, ManualClock, Role, TaskStatus};
    use chrono::{Duration, Utc};

    struct Market {
        engine: Arc<Mutex<EscrowEngine>>,
        clock: Arc<ManualClock>,
        creator: Uuid,
    }

    async fn submitted_market(tasks: usize) -> Market {
        let admin = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let worker = Uuid::new_v4();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let token = Arc::new(InMemoryToken::new());
        let registry = Arc::new(AgentRegistry::new(admin, clock.clone()));
        let mut engine = EscrowEngine::new(admin, token.clone(), registry.clone(), clock.clone());

        registry
            .grant_role(admin, engine.account(), Role::Escrow)
            .unwrap();
        registry
            .register_agent(worker, "worker-key", "ipfs://worker")
            .unwrap();
        token.mint(creator, 1_000_000);
        token.mint(worker, 1_000_000);
        token.approve(creator, engine.account(), Amount::MAX);
        token.approve(worker, engine.account(), Amount::MAX);

        for _ in 0..tasks {
            let id = engine.create_task(creator, 1000, "ipfs://meta").unwrap();
            engine.claim_task(worker, id).unwrap();
            engine.submit_work(worker, id, "ipfs://result").unwrap();
        }

        Market {
            engine: Arc::new(Mutex::new(engine)),
            clock,
            creator,
        }
    }

    #[tokio::test]
    async fn test_sweep_approves_elapsed_tasks() {
        let market = submitted_market(3).await;
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let keeper = Keeper::new(
            market.engine.clone(),
            event_tx,
            shutdown_rx,
            KeeperConfig::default(),
        );

        // Window not elapsed: nothing approved.
        assert_eq!(keeper.sweep().await, 0);
        assert_eq!(
            event_rx.recv().await.unwrap(),
            KeeperEvent::SweepCompleted {
                checked: 3,
                approved: 0
            }
        );

        // Past the deadline: the whole backlog pays out.
        market.clock.advance(Duration::hours(48));
        assert_eq!(keeper.sweep().await, 3);

        for _ in 0..3 {
            assert!(matches!(
                event_rx.recv().await.unwrap(),
                KeeperEvent::TaskAutoApproved { .. }
            ));
        }
        assert_eq!(
            event_rx.recv().await.unwrap(),
            KeeperEvent::SweepCompleted {
                checked: 3,
                approved: 3
            }
        );

        let engine = market.engine.lock().await;
        for id in 0..3 {
            let task = engine.get_task(id).unwrap();
            assert_eq!(task.status, TaskStatus::Approved);
            assert!(task.auto_approved);
        }
    }

    #[tokio::test]
    async fn test_sweep_leaves_disputed_tasks_alone() {
        let market = submitted_market(2).await;
        {
            let mut engine = market.engine.lock().await;
            engine.open_dispute(market.creator, 0, "contested").unwrap();
        }
        market.clock.advance(Duration::hours(48));

        let (event_tx, _event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let keeper = Keeper::new(
            market.engine.clone(),
            event_tx,
            shutdown_rx,
            KeeperConfig::default(),
        );

        assert_eq!(keeper.sweep().await, 1);

        let engine = market.engine.lock().await;
        assert_eq!(engine.get_task(0).unwrap().status, TaskStatus::Disputed);
        assert_eq!(engine.get_task(1).unwrap().status, TaskStatus::Approved);
    }

    #[tokio::test]
    async fn test_keeper_loop_approves_on_interval() {
        let market = submitted_market(1).await;
        market.clock.advance(Duration::hours(48) + Duration::seconds(1));

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let keeper = Keeper::new(
            market.engine.clone(),
            event_tx,
            shutdown_rx,
            KeeperConfig {
                sweep_interval: std::time::Duration::from_millis(10),
            },
        );
        tokio::spawn(keeper.run());

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), event_rx.recv())
            .await
            .expect("keeper should emit within timeout")
            .unwrap();
        assert_eq!(event, KeeperEvent::TaskAutoApproved { task_id: 0 });

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_keeper_loop_shutdown() {
        let market = submitted_market(0).await;
        let (event_tx, _event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let keeper = Keeper::new(
            market.engine.clone(),
            event_tx,
            shutdown_rx,
            KeeperConfig::default(),
        );
        let handle = tokio::spawn(keeper.run());

        let _ = shutdown_tx.send(true);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("keeper should shut down within timeout")
            .expect("keeper task should not panic");
    }
}
