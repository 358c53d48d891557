//! Build queue
//!
//! Bounded-concurrency dispatch for build jobs: a single mpsc channel feeds
//! a fixed pool of worker tasks, each processing one job at a time (FIFO by
//! enqueue order, single writer per job). The pending list and per-job
//! status live in the registry; workers only ever receive job IDs over the
//! channel and commit transitions through the repository.

pub mod worker;

use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use botforge_core::domain::job::BuildStatus;

use crate::config::Config;
use crate::deploy::DeploymentManager;
use crate::harness::{ServiceProbe, TestHarness};
use crate::repository::job_repository;
use crate::runtime::ContainerRuntime;
use crate::template::TemplateStore;
use worker::WorkerContext;

/// In-memory dispatch state shared by the API and the worker pool
///
/// The one-in-flight-per-chatbot invariant is enforced here under a lock
/// scoped to the chatbot set, and cancellation is a per-job flag observed by
/// workers at stage checkpoints.
pub struct DispatchState {
    cancel_flags: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
    active_chatbots: Mutex<HashSet<Uuid>>,
}

impl DispatchState {
    pub fn new() -> Self {
        Self {
            cancel_flags: Mutex::new(HashMap::new()),
            active_chatbots: Mutex::new(HashSet::new()),
        }
    }

    /// Claims the chatbot's single in-flight slot; false if already taken
    pub fn reserve_chatbot(&self, chatbot_id: Uuid) -> bool {
        self.active_chatbots.lock().unwrap().insert(chatbot_id)
    }

    pub fn release_chatbot(&self, chatbot_id: Uuid) {
        self.active_chatbots.lock().unwrap().remove(&chatbot_id);
    }

    /// Registers a job's cancellation flag at enqueue time
    pub fn register_job(&self, job_id: Uuid) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .unwrap()
            .insert(job_id, flag.clone());
        flag
    }

    pub fn cancel_flag(&self, job_id: Uuid) -> Option<Arc<AtomicBool>> {
        self.cancel_flags.lock().unwrap().get(&job_id).cloned()
    }

    /// Sets the cancellation flag; false if the job is not tracked (already
    /// terminal)
    pub fn request_cancel(&self, job_id: Uuid) -> bool {
        match self.cancel_flag(job_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Drops tracking for a job that reached a terminal state
    pub fn forget_job(&self, job_id: Uuid) {
        self.cancel_flags.lock().unwrap().remove(&job_id);
    }
}

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running worker pool
pub struct BuildQueue {
    tx: mpsc::Sender<Uuid>,
    state: Arc<DispatchState>,
}

impl BuildQueue {
    /// Spawns the worker pool and returns the queue handle
    pub fn start(
        pool: SqlitePool,
        config: Arc<Config>,
        templates: Arc<TemplateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ServiceProbe>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Uuid>(1024);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let state = Arc::new(DispatchState::new());

        let harness = TestHarness::new(
            runtime.clone(),
            probe,
            config.probe_attempts,
            config.probe_initial_delay,
        );
        let deployer = DeploymentManager::new(runtime.clone(), config.deploy_network.clone());

        let ctx = Arc::new(WorkerContext {
            pool,
            config: config.clone(),
            templates,
            runtime,
            harness,
            deployer,
            state: state.clone(),
        });

        for i in 0..config.max_workers {
            let worker_id = format!("worker-{}", i);
            let ctx = ctx.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                worker::run_worker(worker_id, ctx, rx).await;
            });
        }

        info!("Started {} build worker(s)", config.max_workers);

        Arc::new(Self { tx, state })
    }

    pub fn state(&self) -> &Arc<DispatchState> {
        &self.state
    }

    /// Hands a queued job ID to the worker pool; non-blocking for the caller
    pub fn submit(&self, job_id: Uuid) -> Result<(), Uuid> {
        self.tx.try_send(job_id).map_err(|_| job_id)
    }

    /// Rebuilds dispatch state from the registry after a restart
    ///
    /// Queued jobs are re-submitted; jobs that crashed mid-flight keep their
    /// last-committed state and stay inspectable, their chatbots' slots
    /// remain reserved so a fresh enqueue is still rejected until they are
    /// resolved.
    pub async fn restore(&self, pool: &SqlitePool) -> Result<usize, sqlx::Error> {
        for chatbot_id in job_repository::find_active_chatbots(pool).await? {
            self.state.reserve_chatbot(chatbot_id);
        }

        let queued = job_repository::find_by_status(pool, BuildStatus::Queued).await?;
        let mut requeued = 0;

        for job in queued {
            self.state.register_job(job.id);
            if self.submit(job.id).is_ok() {
                requeued += 1;
            } else {
                warn!("Dispatch channel full while restoring job {}", job.id);
            }
        }

        if requeued > 0 {
            info!("Restored {} queued job(s) from the registry", requeued);
        }

        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_exclusive_per_chatbot() {
        let state = DispatchState::new();
        let chatbot = Uuid::new_v4();

        assert!(state.reserve_chatbot(chatbot));
        assert!(!state.reserve_chatbot(chatbot));

        state.release_chatbot(chatbot);
        assert!(state.reserve_chatbot(chatbot));
    }

    #[test]
    fn test_cancel_flag_lifecycle() {
        let state = DispatchState::new();
        let job_id = Uuid::new_v4();

        // Unknown jobs cannot be cancelled
        assert!(!state.request_cancel(job_id));

        let flag = state.register_job(job_id);
        assert!(!flag.load(Ordering::SeqCst));

        assert!(state.request_cancel(job_id));
        assert!(flag.load(Ordering::SeqCst));

        state.forget_job(job_id);
        assert!(!state.request_cancel(job_id));
    }
}
