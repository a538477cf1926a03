//! Durable, strictly-ordered, multi-consumer event log.
//!
//! [`EventLog::append`] assigns each event a strictly increasing per-job
//! sequence number and persists it before anything is pushed to live
//! subscribers. [`EventLog::events_since`] is the sole replay primitive: an
//! observer that reconnects hands back the last sequence number it
//! processed and receives exactly the delta (heartbeats filtered), in
//! total per-job order. Delivery across the replay/live seam is
//! at-least-once; payloads are idempotent by construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use autopub_core::types::DbId;
use autopub_db::models::event::JobEvent;
use autopub_db::repositories::EventRepo;
use autopub_db::DbPool;

use crate::bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// The per-job append log. Shared via `Arc<EventLog>`.
pub struct EventLog {
    pool: DbPool,
    bus: EventBus,
    /// One serialization point per job: concurrent producers for the same
    /// job queue here, so sequence assignment and bus publication happen in
    /// the same order. Entries are retained for the log's lifetime.
    append_locks: Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventLog {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            bus: EventBus::default(),
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Append one event, returning the persisted row (with its assigned
    /// sequence number). The event reaches live subscribers only after the
    /// write committed.
    pub async fn append(
        &self,
        job_id: DbId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<JobEvent, EventError> {
        let lock = self.append_lock(job_id);
        let _serialized = lock.lock().await;

        let event = EventRepo::append(&self.pool, job_id, event_type, &payload).await?;
        self.bus.publish(event.clone());
        Ok(event)
    }

    /// The ordered delta after `after_seq`, heartbeats filtered.
    pub async fn events_since(
        &self,
        job_id: DbId,
        after_seq: i64,
    ) -> Result<Vec<JobEvent>, EventError> {
        Ok(EventRepo::list_since(&self.pool, job_id, after_seq).await?)
    }

    /// Subscribe to live events (all jobs; callers filter by job id).
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    fn append_lock(&self, job_id: DbId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.append_locks.lock().expect("append lock map poisoned");
        Arc::clone(
            locks
                .entry(job_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
