//! Session capability interfaces.
//!
//! A [`SessionHandle`] is one remote interactive session. Capture methods
//! are best-effort: they return empty output rather than raising, so a
//! flaky capture never interrupts a running job. Shutdown goes through the
//! fixed [`Stoppable`] capability, implemented once per adapter.

use async_trait::async_trait;

use crate::action::Action;

/// Upper bound on the characters of a captured state description handed to
/// the planner.
pub const MAX_STATE_CHARS: usize = 8_000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session could be provisioned for the resource.
    #[error("Failed to open session for resource '{resource_id}': {message}")]
    OpenFailed {
        resource_id: String,
        message: String,
    },

    /// An action could not be performed against the session.
    #[error("Session action failed: {0}")]
    ActionFailed(String),
}

/// Fixed shutdown capability. Every adapter implements exactly this; there
/// is no per-adapter shutdown signature to discover.
#[async_trait]
pub trait Stoppable: Send + Sync {
    /// Release the remote session. Idempotent and best-effort.
    async fn stop(&self);
}

/// One remote interactive session.
#[async_trait]
pub trait SessionHandle: Stoppable {
    /// The resource id this session operates.
    fn resource_id(&self) -> &str;

    /// Capture a visual frame. Empty on failure.
    async fn capture_frame(&self) -> Vec<u8>;

    /// Capture a bounded textual/structural state description. Empty on
    /// failure; implementations keep it within [`MAX_STATE_CHARS`].
    async fn capture_state(&self) -> String;

    /// Perform one atomic action.
    async fn perform(&self, action: &Action) -> Result<(), SessionError>;
}

/// Provisions session handles per resource id.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(
        &self,
        resource_id: &str,
    ) -> Result<std::sync::Arc<dyn SessionHandle>, SessionError>;
}

/// Truncate a state description to `max` characters on a char boundary,
/// marking the cut.
pub fn bound_state(state: &str, max: usize) -> String {
    if state.len() <= max {
        return state.to_string();
    }
    let mut cut = max;
    while !state.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...[truncated]", &state[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_state_short_passthrough() {
        assert_eq!(bound_state("hello", 10), "hello");
    }

    #[test]
    fn bound_state_truncates_and_marks() {
        let long = "a".repeat(100);
        let bounded = bound_state(&long, 10);
        assert!(bounded.starts_with("aaaaaaaaaa"));
        assert!(bounded.ends_with("[truncated]"));
    }

    #[test]
    fn bound_state_respects_char_boundaries() {
        // Multi-byte characters must not be split.
        let s = "ééééé";
        let bounded = bound_state(s, 3);
        assert!(bounded.starts_with('é'));
    }
}
