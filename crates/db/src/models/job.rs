//! Job entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use autopub_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Exclusive-access key of the remote session this job operates.
    pub resource_id: String,
    pub goal: String,
    /// JSON object of values the planner may substitute into actions.
    pub known_vars: String,
    pub status_id: StatusId,
    /// Last error or terminal explanation, if any.
    pub message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Parse `known_vars` into JSON, falling back to an empty object.
    pub fn known_vars_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.known_vars)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}

/// DTO for submitting a new job via `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJob {
    pub resource_id: String,
    pub goal: String,
    #[serde(default)]
    pub known_vars: Option<serde_json::Value>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 1 = queued, 4 = error).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
