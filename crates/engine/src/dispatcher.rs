//! Queued-job dispatcher.
//!
//! Polls for `queued` job rows and re-submits any the orchestrator does
//! not currently track. During normal operation the API submits directly
//! and this loop finds nothing; after a restart it is what picks the
//! accepted-but-never-run jobs back up. Admission through the
//! orchestrator's active set makes double-dispatch a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use autopub_db::repositories::JobRepo;
use autopub_db::DbPool;

use crate::error::EngineError;
use crate::orchestrator::JobOrchestrator;

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How many queued rows one cycle considers.
const DISPATCH_BATCH: i64 = 20;

/// Background dispatcher: a single long-lived Tokio task.
pub struct JobDispatcher {
    pool: DbPool,
    orchestrator: Arc<JobOrchestrator>,
    poll_interval: Duration,
}

impl JobDispatcher {
    /// Create a dispatcher with the default poll interval.
    pub fn new(pool: DbPool, orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            pool,
            orchestrator,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.try_dispatch().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: submit every queued job not already admitted.
    async fn try_dispatch(&self) -> Result<(), EngineError> {
        let queued = JobRepo::list_queued(&self.pool, DISPATCH_BATCH).await?;

        for job in queued {
            if self.orchestrator.is_tracked(job.id) {
                continue;
            }
            match self.orchestrator.submit(job.id, &job.resource_id).await {
                Ok(()) => {
                    tracing::info!(job_id = job.id, "Queued job dispatched");
                }
                // Lost the race with a direct submission; nothing to do.
                Err(EngineError::Conflict(_)) => {}
                Err(e) => {
                    tracing::error!(job_id = job.id, error = %e, "Failed to dispatch job");
                }
            }
        }
        Ok(())
    }
}
