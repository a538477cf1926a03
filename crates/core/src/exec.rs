//! The executor capability interface.

use async_trait::async_trait;

use crate::action::Action;
use crate::session::SessionHandle;

/// A batch execution failure. Unlike planner errors, these propagate: a
/// failed batch fails the job (no partial-batch idempotency at this layer).
#[derive(Debug, thiserror::Error)]
#[error("Action {index} ({kind}) failed: {message}")]
pub struct ExecError {
    /// 0-based index of the failing action within the batch.
    pub index: usize,
    /// The failing action's kind, for the error message.
    pub kind: String,
    pub message: String,
}

/// Executes action batches against a session. Per-action retry/backoff is
/// internal to implementations of this capability.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        session: &dyn SessionHandle,
        actions: &[Action],
    ) -> Result<(), ExecError>;
}

impl ExecError {
    pub fn new(index: usize, action: &Action, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: format!("{:?}", action.kind).to_lowercase(),
            message: message.into(),
        }
    }
}
