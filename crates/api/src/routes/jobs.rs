//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> submit_job
/// GET    /{id}            -> get_job
/// GET    /{id}/events     -> job_events (cursor replay)
/// POST   /{id}/pause      -> pause_job
/// POST   /{id}/resume     -> resume_job
/// POST   /{id}/abort      -> abort_job
/// POST   /{id}/actions    -> push_manual_action
/// GET    /{id}/feed       -> WebSocket: ordered event feed
/// GET    /{id}/preview    -> WebSocket: latest-wins frame feed
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/events", get(jobs::job_events))
        .route("/{id}/pause", post(jobs::pause_job))
        .route("/{id}/resume", post(jobs::resume_job))
        .route("/{id}/abort", post(jobs::abort_job))
        .route("/{id}/actions", post(jobs::push_manual_action))
        .route("/{id}/feed", get(ws::feed_handler))
        .route("/{id}/preview", get(ws::preview_handler))
}
