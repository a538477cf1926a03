use std::sync::Arc;

use autopub_engine::JobOrchestrator;
use autopub_events::EventLog;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: autopub_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The orchestration core.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Durable event log (shared with the orchestrator).
    pub events: Arc<EventLog>,
}
