//! Deterministic autopilot rules.
//!
//! A small, ordered rule set matched against the captured session state.
//! When a rule fires, the loop performs that one atomic action and skips
//! the planning call for the iteration entirely -- well-known repetitive
//! situations (consent banners, blocking modals) should not cost a round
//! trip to the planner.

use autopub_core::action::Action;

/// One deterministic pattern: a state marker and the single action that
/// handles it.
struct AutopilotRule {
    name: &'static str,
    /// Substring of the state description that identifies the situation.
    marker: &'static str,
    /// Target the action activates.
    target: &'static str,
}

/// Rules are evaluated in order; the first match wins.
const RULES: &[AutopilotRule] = &[
    AutopilotRule {
        name: "dismiss-cookie-banner",
        marker: "cookie-consent",
        target: "cookie_accept",
    },
    AutopilotRule {
        name: "close-blocking-modal",
        marker: "modal-overlay",
        target: "modal_close",
    },
    AutopilotRule {
        name: "dismiss-notification-prompt",
        marker: "notification-prompt",
        target: "prompt_dismiss",
    },
];

/// Evaluate the rule set against a state description.
///
/// Returns the matched rule's name and its single atomic action, or `None`
/// when nothing matches (including the empty state a failed capture
/// yields).
pub fn evaluate(state: &str) -> Option<(&'static str, Action)> {
    if state.is_empty() {
        return None;
    }
    RULES
        .iter()
        .find(|rule| state.contains(rule.marker))
        .map(|rule| (rule.name, Action::click(rule.target)))
}
