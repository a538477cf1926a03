//! The atomic action data model.
//!
//! An [`Action`] is one step a job performs against its remote session. The
//! planner returns ordered lists of them, autopilot rules and operators
//! produce single ones, and the executor carries them out. What a `target`
//! token means (a selector, a named affordance) is the session adapter's
//! concern -- the core treats it as opaque.

use serde::{Deserialize, Serialize};

/// The kind of interaction an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Activate the target element.
    Click,
    /// Type `value` into the target field.
    Fill,
    /// Choose `value` from the target option list.
    Select,
    /// Press a named key (`value`) with the session focused.
    Press,
    /// Scroll the target (or the page when no target) into view.
    Scroll,
    /// Wait for the session to settle; `value` is an optional duration
    /// in milliseconds.
    Wait,
}

/// One atomic step against the remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Opaque target token interpreted by the session adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Input value for `fill`/`select`/`press`/`wait`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Action {
    /// A click on `target`.
    pub fn click(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Click,
            target: Some(target.into()),
            value: None,
        }
    }

    /// Fill `target` with `value`.
    pub fn fill(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Fill,
            target: Some(target.into()),
            value: Some(value.into()),
        }
    }

    /// Wait for the session to settle.
    pub fn wait() -> Self {
        Self {
            kind: ActionKind::Wait,
            target: None,
            value: None,
        }
    }
}

/// Target token for the generic "activate the single visible primary
/// continue/confirm affordance" fallback used when planning yields nothing.
pub const PRIMARY_AFFORDANCE: &str = "primary_affordance";
