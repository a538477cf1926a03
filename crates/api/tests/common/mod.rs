use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use sqlx::SqlitePool;
use tower::ServiceExt;

use autopub_api::config::ServerConfig;
use autopub_api::router::build_app_router;
use autopub_api::state::AppState;
use autopub_core::action::Action;
use autopub_core::gate::AdaptiveGate;
use autopub_core::plan::{CompletionCheck, PlanContext, Planner, PlannerError};
use autopub_engine::JobOrchestrator;
use autopub_events::EventLog;
use autopub_planner::PlannerApiVersion;
use autopub_session::inproc::InProcProvider;
use autopub_session::SessionExecutor;

/// Planner stub: no steps, completion always confirmed. Jobs submitted
/// through the test app finish in one batch.
struct PublishedPlanner;

#[async_trait]
impl Planner for PublishedPlanner {
    async fn next_steps(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Action>, PlannerError> {
        Ok(Vec::new())
    }

    async fn completion_check(
        &self,
        _ctx: &PlanContext<'_>,
    ) -> Result<CompletionCheck, PlannerError> {
        Ok(CompletionCheck::Published)
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        pool_size: 2,
        lock_timeout_secs: 5,
        max_batches: 3,
        preview_interval_ms: 50,
        planner_url: "http://localhost:0".to_string(),
        planner_api_key: None,
        planner_version: PlannerApiVersion::V2,
        planner_timeout_secs: 5,
        gate_min: 1,
        gate_max: 8,
        gate_initial: 4,
        gate_relax_every: 10,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool and stubbed collaborators.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app(pool: SqlitePool) -> Router {
    let config = test_config();
    let events = Arc::new(EventLog::new(pool.clone()));
    let gate = AdaptiveGate::new(config.gate_config()).expect("test gate config");

    let orchestrator = JobOrchestrator::new(
        pool.clone(),
        Arc::clone(&events),
        Arc::new(PublishedPlanner),
        Arc::new(SessionExecutor::with_retry_delay(Duration::from_millis(1))),
        Arc::new(InProcProvider::default()),
        gate,
        config.orchestrator_config(),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator,
        events,
    };
    build_app_router(state, &config)
}

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request build"),
    )
    .await
    .expect("request should complete")
}

/// Issue a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request build"),
    )
    .await
    .expect("request should complete")
}

/// Issue a POST request with an empty body.
pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .expect("request build"),
    )
    .await
    .expect("request should complete")
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Assert a status and return the parsed body.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
