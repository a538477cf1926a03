use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autopub_api::config::ServerConfig;
use autopub_api::router::build_app_router;
use autopub_api::state::AppState;
use autopub_core::gate::AdaptiveGate;
use autopub_engine::{JobDispatcher, JobOrchestrator};
use autopub_events::EventLog;
use autopub_planner::HttpPlanner;
use autopub_session::inproc::InProcProvider;
use autopub_session::SessionExecutor;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autopub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://autopub.db".to_string());

    let pool = autopub_db::create_pool(&database_url)
        .await
        .expect("Failed to open database");
    autopub_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    autopub_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!(database_url = %database_url, "Database ready");

    // --- Event log ---
    let events = Arc::new(EventLog::new(pool.clone()));

    // --- Planner admission gate ---
    let gate = AdaptiveGate::new(config.gate_config()).expect("Invalid gate configuration");

    // --- Collaborators ---
    let planner =
        Arc::new(HttpPlanner::new(config.planner_config()).expect("Invalid planner configuration"));
    let executor = Arc::new(SessionExecutor::new());
    // In-process sessions; a remote session gateway plugs in through the
    // same SessionProvider capability.
    let sessions = Arc::new(InProcProvider::default());

    // --- Orchestrator ---
    let orchestrator = JobOrchestrator::new(
        pool.clone(),
        Arc::clone(&events),
        planner,
        executor,
        sessions,
        gate,
        config.orchestrator_config(),
    );

    // --- Dispatcher (restart recovery for queued jobs) ---
    let dispatcher = JobDispatcher::new(pool.clone(), Arc::clone(&orchestrator));
    let dispatcher_cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher_token = dispatcher_cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_token).await;
    });

    // --- App state / router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        events,
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST/PORT");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(%addr, "autopub API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    // --- Drain ---
    dispatcher_cancel.cancel();
    let _ = dispatcher_handle.await;
    orchestrator.shutdown().await;
}
