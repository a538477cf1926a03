//! Event-type constants for the per-job event log.
//!
//! Used by the engine when appending events and by the API when forwarding
//! them over the push feed. Replay (`events_since`) filters
//! [`EVENT_HEARTBEAT`] -- heartbeats exist only to keep long-lived
//! connections alive and carry no state.

/// Lifecycle stage transition (`running`, `published`, `exhausted`,
/// `aborted`, `fail`).
pub const EVENT_STAGE: &str = "stage";

/// A batch of actions was chosen (payload carries the source:
/// `planner`, `autopilot`, `manual`, or `fallback`).
pub const EVENT_PLAN: &str = "plan";

/// Result of a completion check (`published`, `ready_to_publish`,
/// `in_progress`).
pub const EVENT_CHECK: &str = "completion_check";

/// Post-execution artifacts: bounded state snapshot plus visual frame
/// metadata.
pub const EVENT_ARTIFACT: &str = "artifact";

/// A failure explanation, always appended before the terminal status is
/// committed.
pub const EVENT_ERROR: &str = "error";

/// Connection keep-alive. Filtered out of cursor replay.
pub const EVENT_HEARTBEAT: &str = "heartbeat";
