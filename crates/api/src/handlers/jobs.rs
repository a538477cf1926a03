//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use autopub_core::action::Action;
use autopub_core::error::CoreError;
use autopub_core::types::DbId;
use autopub_db::models::job::{Job, JobListQuery, SubmitJob};
use autopub_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID, mapping a missing row to 404.
async fn find_job(pool: &autopub_db::DbPool, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}

/// Existence check shared with the WebSocket upgrade handlers (they must
/// 404 before upgrading).
pub async fn job_exists(state: &AppState, job_id: DbId) -> AppResult<()> {
    find_job(&state.pool, job_id).await.map(|_| ())
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a job and hand it to the orchestrator. Returns 201 with the
/// created row; the job starts in `queued` and progresses asynchronously.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    if input.resource_id.trim().is_empty() {
        return Err(AppError::BadRequest("resource_id must not be empty".to_string()));
    }
    if input.goal.trim().is_empty() {
        return Err(AppError::BadRequest("goal must not be empty".to_string()));
    }

    let job = JobRepo::create(&state.pool, &input).await?;
    state.orchestrator.submit(job.id, &job.resource_id).await?;

    tracing::info!(job_id = job.id, resource_id = %job.resource_id, "Job submitted");
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List jobs newest-first. Supports optional `status_id`, `limit`, and
/// `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Event replay
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Replay cursor: return events with `seq > after`. Defaults to 0
    /// (everything).
    #[serde(default)]
    pub after: i64,
}

/// GET /api/v1/jobs/{id}/events?after=N
///
/// The ordered event delta past the cursor, heartbeats filtered. This is
/// the reconnect primitive behind the push feed.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<EventsQuery>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let events = state.events.events_since(job_id, params.after).await?;
    Ok(Json(DataResponse { data: events }))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    state.orchestrator.control(job_id).await.set_paused(true);
    tracing::info!(job_id, "Pause requested");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    state.orchestrator.control(job_id).await.set_paused(false);
    tracing::info!(job_id, "Resume requested");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/{id}/abort
///
/// Cooperative: the job unwinds at its next yield point, terminal status
/// `stopped` (not an error).
pub async fn abort_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    state.orchestrator.control(job_id).await.request_abort();
    tracing::info!(job_id, "Abort requested");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/{id}/actions
///
/// Queue one manual override action. The job executes queued overrides,
/// in order, before its next planning step.
pub async fn push_manual_action(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(action): Json<Action>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    state.orchestrator.control(job_id).await.push_manual(action);
    tracing::info!(job_id, "Manual action queued");
    Ok(StatusCode::ACCEPTED)
}
