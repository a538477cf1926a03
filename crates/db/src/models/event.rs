//! Job event entity model.

use serde::Serialize;
use sqlx::FromRow;

use autopub_core::types::{DbId, Timestamp};

/// A row from the `job_events` table.
///
/// `seq` is strictly increasing per job with no gaps; it doubles as the
/// replay cursor observers hand back on reconnect.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobEvent {
    pub id: DbId,
    pub job_id: DbId,
    pub seq: i64,
    pub event_type: String,
    /// JSON text. Use [`JobEvent::payload_json`] for the parsed form.
    pub payload: String,
    pub created_at: Timestamp,
}

impl JobEvent {
    /// Parse the payload, falling back to JSON `null` on corruption.
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}
