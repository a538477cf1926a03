//! Standard executor: forwards action batches to the session handle.
//!
//! Retry policy is internal to this capability (the orchestration core
//! never retries a batch): each failing action gets exactly one retry
//! after a short delay before the batch is declared failed.

use std::time::Duration;

use async_trait::async_trait;

use autopub_core::action::Action;
use autopub_core::exec::{ExecError, Executor};
use autopub_core::session::SessionHandle;

/// Delay before retrying a failed action.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct SessionExecutor {
    retry_delay: Duration,
}

impl SessionExecutor {
    pub fn new() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }
}

impl Default for SessionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for SessionExecutor {
    async fn execute(
        &self,
        session: &dyn SessionHandle,
        actions: &[Action],
    ) -> Result<(), ExecError> {
        for (index, action) in actions.iter().enumerate() {
            if let Err(first) = session.perform(action).await {
                tracing::warn!(
                    resource_id = %session.resource_id(),
                    index,
                    error = %first,
                    "Action failed, retrying once",
                );
                tokio::time::sleep(self.retry_delay).await;
                session
                    .perform(action)
                    .await
                    .map_err(|e| ExecError::new(index, action, e.to_string()))?;
            }
        }
        Ok(())
    }
}
