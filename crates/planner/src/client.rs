//! Versioned HTTP client for the planner service.
//!
//! The service has two historical request shapes. Which one to speak is a
//! configuration decision, not a runtime guess: the client sends the
//! configured version, and if the server rejects that shape outright
//! (400/404/422) a V2 client falls back to V1 exactly once for its
//! lifetime -- the one documented fallback path. There is no other probing.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use autopub_core::action::Action;
use autopub_core::plan::{CompletionCheck, JobTask, PlanContext, Planner, PlannerError};

use crate::parse::{parse_completion, parse_steps};

/// Request-payload generation understood by the planner service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerApiVersion {
    /// Legacy flat payload.
    V1,
    /// Current nested payload.
    V2,
}

impl PlannerApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl FromStr for PlannerApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(format!("Unknown planner API version '{other}'")),
        }
    }
}

/// Connection settings for the planner service.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Service root, e.g. `http://localhost:8700`.
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    pub version: PlannerApiVersion,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Planner implementation talking HTTP.
pub struct HttpPlanner {
    http: reqwest::Client,
    config: PlannerConfig,
    /// Set after the single permitted V2 -> V1 fallback.
    fell_back: AtomicBool,
}

/// Current nested payload shape.
#[derive(Serialize)]
struct RequestV2<'a> {
    task: &'a JobTask,
    state: &'a str,
    history: serde_json::Value,
    max_steps: usize,
}

/// Legacy flat payload shape.
#[derive(Serialize)]
struct RequestV1<'a> {
    goal: &'a str,
    known_vars: &'a serde_json::Value,
    state: &'a str,
    history: serde_json::Value,
    max_steps: usize,
}

impl HttpPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self, PlannerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlannerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            config,
            fell_back: AtomicBool::new(false),
        })
    }

    fn effective_version(&self) -> PlannerApiVersion {
        if self.fell_back.load(Ordering::Relaxed) {
            PlannerApiVersion::V1
        } else {
            self.config.version
        }
    }

    /// POST `ctx` to `endpoint` (`plan` or `check`), returning the raw body.
    async fn call(&self, endpoint: &str, ctx: &PlanContext<'_>) -> Result<String, PlannerError> {
        let version = self.effective_version();
        match self.post(version, endpoint, ctx).await {
            Err(PlannerError::Malformed(reason))
                if version == PlannerApiVersion::V2 && !self.fell_back.load(Ordering::Relaxed) =>
            {
                // The server rejected the V2 shape. Downgrade for the rest
                // of this client's lifetime and retry once.
                self.fell_back.store(true, Ordering::Relaxed);
                tracing::warn!(
                    reason = %reason,
                    "Planner rejected v2 payload shape, falling back to v1",
                );
                self.post(PlannerApiVersion::V1, endpoint, ctx).await
            }
            other => other,
        }
    }

    async fn post(
        &self,
        version: PlannerApiVersion,
        endpoint: &str,
        ctx: &PlanContext<'_>,
    ) -> Result<String, PlannerError> {
        let url = format!("{}/{}/{endpoint}", self.config.base_url, version.as_str());
        let history = serde_json::to_value(ctx.history)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));

        let mut request = self.http.post(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request = match version {
            PlannerApiVersion::V2 => request.json(&RequestV2 {
                task: ctx.task,
                state: ctx.state,
                history,
                max_steps: ctx.max_steps,
            }),
            PlannerApiVersion::V1 => request.json(&RequestV1 {
                goal: &ctx.task.goal,
                known_vars: &ctx.task.known_vars,
                state: ctx.state,
                history,
                max_steps: ctx.max_steps,
            }),
        };

        let response = request
            .send()
            .await
            .map_err(|e| PlannerError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(PlannerError::RateLimited);
        }
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::NOT_FOUND
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(PlannerError::Malformed(format!(
                "{} rejected with {status}",
                version.as_str()
            )));
        }
        if !status.is_success() {
            return Err(PlannerError::Transport(format!("HTTP {status} from {url}")));
        }

        response
            .text()
            .await
            .map_err(|e| PlannerError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn next_steps(&self, ctx: &PlanContext<'_>) -> Result<Vec<Action>, PlannerError> {
        let body = self.call("plan", ctx).await?;
        Ok(parse_steps(&body, ctx.max_steps))
    }

    async fn completion_check(
        &self,
        ctx: &PlanContext<'_>,
    ) -> Result<CompletionCheck, PlannerError> {
        let body = self.call("check", ctx).await?;
        Ok(parse_completion(&body))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn version_parses_from_config_strings() {
        assert_eq!("v1".parse::<PlannerApiVersion>().unwrap(), PlannerApiVersion::V1);
        assert_eq!("V2".parse::<PlannerApiVersion>().unwrap(), PlannerApiVersion::V2);
        assert!("v3".parse::<PlannerApiVersion>().is_err());
    }

    #[test]
    fn v2_payload_nests_the_task() {
        let task = JobTask {
            goal: "publish".to_string(),
            known_vars: json!({"title": "Lamp"}),
        };
        let payload = serde_json::to_value(RequestV2 {
            task: &task,
            state: "form: empty",
            history: json!([]),
            max_steps: 5,
        })
        .unwrap();

        assert_eq!(payload["task"]["goal"], "publish");
        assert_eq!(payload["task"]["known_vars"]["title"], "Lamp");
        assert_eq!(payload["max_steps"], 5);
    }

    #[test]
    fn v1_payload_is_flat() {
        let task = JobTask {
            goal: "publish".to_string(),
            known_vars: json!({}),
        };
        let payload = serde_json::to_value(RequestV1 {
            goal: &task.goal,
            known_vars: &task.known_vars,
            state: "form: empty",
            history: json!([]),
            max_steps: 3,
        })
        .unwrap();

        assert_eq!(payload["goal"], "publish");
        assert!(payload.get("task").is_none());
    }
}
