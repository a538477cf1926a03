//! Job admission, scheduling, and cleanup.
//!
//! [`JobOrchestrator`] accepts submissions, runs one
//! [`ExecutionLoop`](crate::run_loop::ExecutionLoop) per job on a bounded
//! worker pool, and guarantees the invariant everything else depends on:
//! the job's resource lock is held for the whole run and released on every
//! exit path -- success, failure, panic, or cooperative abort.
//!
//! Failure semantics: any error escaping the execution loop is caught
//! exactly once here, recorded as an `error` event *before* the terminal
//! status is committed (live observers always see the explanation first),
//! and the job ends in status `error`. The orchestrator itself never
//! errors out of `submit`/`control` in normal operation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use autopub_core::exec::Executor;
use autopub_core::gate::AdaptiveGate;
use autopub_core::job_events::{EVENT_ERROR, EVENT_HEARTBEAT, EVENT_STAGE};
use autopub_core::locks::SessionLocks;
use autopub_core::plan::{JobTask, Planner};
use autopub_core::session::SessionProvider;
use autopub_core::types::DbId;
use autopub_db::models::status::JobStatus;
use autopub_db::repositories::JobRepo;
use autopub_db::DbPool;
use autopub_events::EventLog;
use autopub_session::{spawn_producer, stop_producer};

use crate::control::{ControlRegistry, ControlState};
use crate::error::EngineError;
use crate::run_loop::{ExecutionLoop, LoopConfig, RunOutcome};

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker pool size: jobs running concurrently. Excess submissions
    /// queue on the pool semaphore.
    pub pool_size: usize,
    /// How long a worker waits for its resource lock before the job fails
    /// as ResourceBusy.
    pub lock_timeout: Duration,
    /// Preview frame capture rate.
    pub preview_interval: Duration,
    /// How long to wait for the preview producer on teardown.
    pub preview_join_timeout: Duration,
    /// Heartbeat event cadence while the job runs.
    pub heartbeat_interval: Duration,
    /// How long `shutdown` waits for jobs to wind down.
    pub shutdown_timeout: Duration,
    pub loop_config: LoopConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            lock_timeout: Duration::from_secs(120),
            preview_interval: Duration::from_millis(500),
            preview_join_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(10),
            loop_config: LoopConfig::default(),
        }
    }
}

/// Owns all mutable orchestration state. Shared via `Arc`.
pub struct JobOrchestrator {
    pool: DbPool,
    events: Arc<EventLog>,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    sessions: Arc<dyn SessionProvider>,
    gate: AdaptiveGate,
    locks: SessionLocks,
    controls: ControlRegistry,
    slots: Arc<Semaphore>,
    /// Job ids currently admitted (queued on the pool or running).
    active: Mutex<HashSet<DbId>>,
    shutdown: CancellationToken,
    config: OrchestratorConfig,
    /// Handle to ourselves for spawning workers; set by `new`.
    self_ref: Weak<Self>,
}

impl JobOrchestrator {
    pub fn new(
        pool: DbPool,
        events: Arc<EventLog>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        sessions: Arc<dyn SessionProvider>,
        gate: AdaptiveGate,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            pool,
            events,
            planner,
            executor,
            sessions,
            gate,
            locks: SessionLocks::new(),
            controls: ControlRegistry::new(),
            slots: Arc::new(Semaphore::new(config.pool_size)),
            active: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            config,
            self_ref: self_ref.clone(),
        })
    }

    /// Admit a job and schedule it on the worker pool.
    ///
    /// Returns `Conflict` if the job is already admitted or the
    /// orchestrator is shutting down; both are caller-visible conditions,
    /// not failures of the orchestrator itself.
    pub async fn submit(&self, job_id: DbId, resource_id: &str) -> Result<(), EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Conflict(
                "Orchestrator is shutting down".to_string(),
            ));
        }
        let this = self
            .self_ref
            .upgrade()
            .ok_or_else(|| EngineError::Internal("Orchestrator dropped".to_string()))?;
        if !self.active.lock().expect("active set poisoned").insert(job_id) {
            return Err(EngineError::Conflict(format!(
                "Job {job_id} is already admitted"
            )));
        }

        tracing::info!(job_id, resource_id, "Job admitted");
        let resource_id = resource_id.to_string();
        tokio::spawn(async move {
            this.run_job(job_id, resource_id).await;
        });
        Ok(())
    }

    /// The job's control state, created on first access.
    pub async fn control(&self, job_id: DbId) -> Arc<ControlState> {
        self.controls.get_or_create(job_id).await
    }

    /// Whether a job is currently admitted (queued or running).
    pub fn is_tracked(&self, job_id: DbId) -> bool {
        self.active.lock().expect("active set poisoned").contains(&job_id)
    }

    /// Live event log handle (shared with the API layer).
    pub fn events(&self) -> Arc<EventLog> {
        Arc::clone(&self.events)
    }

    /// Cooperatively stop everything: refuse new submissions, request
    /// abort on all running jobs, and wait (bounded) for them to drain.
    pub async fn shutdown(&self) {
        tracing::info!("Orchestrator shutting down");
        self.shutdown.cancel();
        for control in self.controls.all().await {
            control.request_abort();
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            if self.active.lock().expect("active set poisoned").is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let left = self.active.lock().expect("active set poisoned").len();
                tracing::warn!(jobs_left = left, "Shutdown timeout, abandoning wait");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tracing::info!("Orchestrator shut down complete");
    }

    // ---- worker procedure ----

    /// One job, end to end. Never propagates: the error boundary and the
    /// unconditional teardown both live here.
    async fn run_job(self: Arc<Self>, job_id: DbId, resource_id: String) {
        if let Err(e) = self.run_job_inner(job_id, &resource_id).await {
            tracing::error!(job_id, error = %e, "Job failed");
            // Explanation first, terminal status second -- a live observer
            // never sees the job disappear without the reason.
            let _ = self
                .events
                .append(job_id, EVENT_ERROR, json!({ "message": e.to_string() }))
                .await;
            let _ = self
                .events
                .append(job_id, EVENT_STAGE, json!({ "stage": "fail" }))
                .await;
            let _ = JobRepo::finish_if_active(
                &self.pool,
                job_id,
                JobStatus::Error,
                Some(&e.to_string()),
            )
            .await;
        }

        self.teardown(job_id).await;
        self.active.lock().expect("active set poisoned").remove(&job_id);
    }

    async fn run_job_inner(&self, job_id: DbId, resource_id: &str) -> Result<(), EngineError> {
        let _slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Internal("Worker pool closed".to_string()))?;

        // Exclusive access to the resource for the whole run. Bounded wait:
        // on timeout the job fails as ResourceBusy without ever starting.
        let _lock = self
            .locks
            .acquire(resource_id, self.config.lock_timeout)
            .await?;

        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("Job {job_id} not found")))?;

        JobRepo::mark_running(&self.pool, job_id).await?;
        self.events
            .append(job_id, EVENT_STAGE, json!({ "stage": "running" }))
            .await?;

        let session = self.sessions.open(resource_id).await?;
        let control = self.controls.get_or_create(job_id).await;

        let producer = spawn_producer(
            Arc::clone(&session),
            control.preview(),
            self.config.preview_interval,
        );
        control.attach_producer(producer);
        let heartbeat = self.spawn_heartbeat(job_id);

        let task = JobTask {
            goal: job.goal.clone(),
            known_vars: job.known_vars_json(),
        };
        let exec_loop = ExecutionLoop::new(
            job_id,
            task,
            Arc::clone(&self.planner),
            Arc::clone(&self.executor),
            Arc::clone(&session),
            Arc::clone(&self.events),
            Arc::clone(&control),
            self.gate.clone(),
            self.config.loop_config.clone(),
        );

        // The loop runs in its own task so a panic inside it surfaces as a
        // JoinError here instead of skipping cleanup.
        let outcome = match tokio::spawn(exec_loop.run()).await {
            Ok(result) => result,
            Err(join_error) => Err(EngineError::Internal(format!(
                "Execution loop panicked: {join_error}"
            ))),
        };

        heartbeat.abort();
        session.stop().await;

        match outcome? {
            RunOutcome::Published => {
                tracing::info!(job_id, "Job published");
                JobRepo::finish_if_active(&self.pool, job_id, JobStatus::Done, None).await?;
            }
            RunOutcome::Exhausted => {
                tracing::warn!(job_id, "Job exhausted its batch budget");
                JobRepo::finish_if_active(
                    &self.pool,
                    job_id,
                    JobStatus::Stopped,
                    Some("Stopped without confirmed completion"),
                )
                .await?;
            }
            RunOutcome::Aborted => {
                tracing::info!(job_id, "Job aborted by operator");
                JobRepo::finish_if_active(
                    &self.pool,
                    job_id,
                    JobStatus::Stopped,
                    Some("Aborted by operator"),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Stop the preview producer (bounded join) and retire the control
    /// state. Runs for every job that was admitted, on every path.
    async fn teardown(&self, job_id: DbId) {
        if let Some(control) = self.controls.remove(job_id).await {
            let preview = control.preview();
            if let Some(producer) = control.take_producer() {
                stop_producer(&preview, producer, self.config.preview_join_timeout).await;
            } else {
                preview.stop();
            }
            // Drain any operator actions that never ran.
            let leftover = control.drain_manual();
            if !leftover.is_empty() {
                tracing::debug!(
                    job_id,
                    count = leftover.len(),
                    "Discarding unconsumed manual actions",
                );
            }
        }
    }

    fn spawn_heartbeat(&self, job_id: DbId) -> tokio::task::JoinHandle<()> {
        let events = Arc::clone(&self.events);
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so heartbeats
            // start one interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if events
                    .append(job_id, EVENT_HEARTBEAT, json!({}))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
    }
}
