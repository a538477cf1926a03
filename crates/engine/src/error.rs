//! Engine error taxonomy.
//!
//! Everything that can terminate a job with status `error` funnels through
//! [`EngineError`]; it is caught exactly once, at the orchestrator's worker
//! boundary. Planner failures are deliberately absent -- they recover inside
//! the execution loop and never surface here.

use autopub_core::exec::ExecError;
use autopub_core::locks::LockTimeout;
use autopub_core::session::SessionError;
use autopub_events::EventError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The resource lock was not acquired within the timeout; the job
    /// never ran.
    #[error("Resource busy: {0}")]
    ResourceBusy(#[from] LockTimeout),

    /// An action batch failed. No partial-batch recovery at this layer.
    #[error("Executor failed: {0}")]
    Executor(#[from] ExecError),

    /// The session could not be provisioned or operated.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The event log could not be written.
    #[error("Event log error: {0}")]
    Event(#[from] EventError),

    /// A job-record query failed.
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    /// The submission conflicts with current state (duplicate job id,
    /// orchestrator shutting down).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
