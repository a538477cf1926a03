//! The planner capability interface.
//!
//! A [`Planner`] is the external service that decides what a job should do
//! next. It is never trusted to produce well-formed output: implementations
//! degrade malformed replies to "no steps" / [`CompletionCheck::InProgress`]
//! rather than erroring, and the engine treats every [`PlannerError`] as a
//! locally-recoverable condition -- a planner failure never fails a job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::Action;

/// What a job is trying to accomplish, fixed at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTask {
    /// Free-form description of the goal (e.g. "publish the draft listing").
    pub goal: String,
    /// Values the planner may substitute into actions (field contents,
    /// option labels). Opaque JSON object.
    #[serde(default)]
    pub known_vars: serde_json::Value,
}

impl JobTask {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            known_vars: serde_json::Value::Object(Default::default()),
        }
    }
}

/// One completed batch, summarized for the planner's context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 1-based batch number.
    pub batch: u32,
    /// The actions that were executed.
    pub actions: Vec<Action>,
    /// Short outcome note ("ok", or the executor's error text).
    pub note: String,
}

/// Everything a planner call sees.
pub struct PlanContext<'a> {
    /// Bounded textual/structural description of the current session state.
    pub state: &'a str,
    pub task: &'a JobTask,
    pub history: &'a [HistoryEntry],
    /// Upper bound on the number of actions a plan may contain.
    pub max_steps: usize,
}

/// Outcome of a completion check.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionCheck {
    /// The task is confirmed done.
    Published,
    /// One final batch of actions completes the task.
    ReadyToPublish(Vec<Action>),
    /// Not done yet -- or the reply could not be interpreted, which must be
    /// treated identically.
    InProgress,
}

/// Planner call failures. All of them recover locally in the engine; only
/// `RateLimited` carries a side effect (the admission gate tightens).
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The downstream service is shedding load (HTTP 429/503 or provider
    /// equivalent).
    #[error("Planner rate limited")]
    RateLimited,

    /// The request never completed (connect/timeout/transport).
    #[error("Planner transport error: {0}")]
    Transport(String),

    /// The reply arrived but could not be interpreted at all.
    #[error("Planner reply malformed: {0}")]
    Malformed(String),
}

/// External planning capability.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce an ordered list of at most `ctx.max_steps` atomic actions.
    /// An empty list means "nothing to suggest" -- the caller decides whether
    /// that signals completion or a stall.
    async fn next_steps(&self, ctx: &PlanContext<'_>) -> Result<Vec<Action>, PlannerError>;

    /// Classify the job's progress.
    async fn completion_check(&self, ctx: &PlanContext<'_>)
        -> Result<CompletionCheck, PlannerError>;
}
