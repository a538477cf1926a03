//! Per-resource exclusive locks.
//!
//! [`SessionLocks`] hands out one mutex per resource id, created lazily on
//! first reference and retained for the registry's lifetime (no GC at this
//! scale). Acquisition is timeout-bounded so a contended submission queues
//! for a while and then fails with [`LockTimeout`] instead of waiting
//! forever. The returned guard is owned, so it can cross `await` points and
//! task boundaries; releasing is dropping it -- which happens on every exit
//! path, including panics of the holding task's scope.
//!
//! The registry is explicit instance state: two registries never interfere,
//! which keeps independent orchestrators (and tests) isolated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

/// Held for the full duration of a job; dropping it releases the resource.
pub type SessionLockGuard = OwnedMutexGuard<()>;

/// The lock for a resource was not acquired within the allowed wait.
#[derive(Debug, thiserror::Error)]
#[error("Resource '{resource_id}' is locked by another job (waited {waited_ms}ms)")]
pub struct LockTimeout {
    pub resource_id: String,
    pub waited_ms: u64,
}

/// Registry of per-resource mutexes.
#[derive(Default)]
pub struct SessionLocks {
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `resource_id`, waiting at most `timeout`.
    ///
    /// At most one guard per resource id exists at any instant; that is the
    /// single correctness property every caller leans on.
    pub async fn acquire(
        &self,
        resource_id: &str,
        timeout: Duration,
    ) -> Result<SessionLockGuard, LockTimeout> {
        let entry = self.entry(resource_id);
        match tokio::time::timeout(timeout, entry.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(LockTimeout {
                resource_id: resource_id.to_string(),
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Number of resource ids ever referenced. Entries are never removed.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().expect("lock registry mutex poisoned").len()
    }

    fn entry(&self, resource_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut entries = self.entries.lock().expect("lock registry mutex poisoned");
        Arc::clone(
            entries
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
