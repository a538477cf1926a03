//! Repository for the `job_events` table.
//!
//! Sequence numbers are assigned inside the INSERT itself
//! (`COALESCE(MAX(seq), 0) + 1` per job), so one statement both claims and
//! writes the next id -- SQLite's single-writer execution makes the pair
//! atomic, and the `UNIQUE (job_id, seq)` constraint turns any violation of
//! that assumption into a hard error instead of a silent gap or duplicate.

use chrono::Utc;

use autopub_core::job_events::EVENT_HEARTBEAT;
use autopub_core::types::DbId;

use crate::models::event::JobEvent;
use crate::DbPool;

/// Column list for `job_events` queries.
const COLUMNS: &str = "id, job_id, seq, event_type, payload, created_at";

/// Provides append/replay operations for the per-job event log.
pub struct EventRepo;

impl EventRepo {
    /// Append one event, returning the assigned per-job sequence number.
    pub async fn append(
        pool: &DbPool,
        job_id: DbId,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<JobEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_events (job_id, seq, event_type, payload, created_at) \
             VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM job_events WHERE job_id = ?), ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobEvent>(&query)
            .bind(job_id)
            .bind(job_id)
            .bind(event_type)
            .bind(payload.to_string())
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Events for `job_id` with `seq > after_seq`, in sequence order.
    ///
    /// Heartbeat events are filtered out: they keep live connections warm
    /// and carry nothing worth replaying.
    pub async fn list_since(
        pool: &DbPool,
        job_id: DbId,
        after_seq: i64,
    ) -> Result<Vec<JobEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_events \
             WHERE job_id = ? AND seq > ? AND event_type != ? \
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, JobEvent>(&query)
            .bind(job_id)
            .bind(after_seq)
            .bind(EVENT_HEARTBEAT)
            .fetch_all(pool)
            .await
    }
}
