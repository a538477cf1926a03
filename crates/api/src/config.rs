use std::time::Duration;

use autopub_core::gate::GateConfig;
use autopub_engine::{LoopConfig, OrchestratorConfig};
use autopub_planner::{PlannerApiVersion, PlannerConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,

    /// Worker pool size (default: `4`).
    pub pool_size: usize,
    /// Resource lock acquisition timeout in seconds (default: `120`).
    pub lock_timeout_secs: u64,
    /// Batch budget per job (default: `30`).
    pub max_batches: u32,
    /// Preview frame capture interval in milliseconds (default: `500`).
    pub preview_interval_ms: u64,

    /// Planner service root (default: `http://localhost:8700`).
    pub planner_url: String,
    /// Bearer token for the planner service, if any.
    pub planner_api_key: Option<String>,
    /// Planner payload version, `v1` or `v2` (default: `v2`).
    pub planner_version: PlannerApiVersion,
    /// Planner request timeout in seconds (default: `60`).
    pub planner_timeout_secs: u64,

    /// Admission gate floor (default: `1`).
    pub gate_min: usize,
    /// Admission gate ceiling (default: `8`).
    pub gate_max: usize,
    /// Admission gate starting limit (default: `4`).
    pub gate_initial: usize,
    /// Consecutive successes per gate relax step (default: `10`).
    pub gate_relax_every: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `HOST`                 | `0.0.0.0`                |
    /// | `PORT`                 | `3000`                   |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                     |
    /// | `POOL_SIZE`            | `4`                      |
    /// | `LOCK_TIMEOUT_SECS`    | `120`                    |
    /// | `MAX_BATCHES`          | `30`                     |
    /// | `PREVIEW_INTERVAL_MS`  | `500`                    |
    /// | `PLANNER_URL`          | `http://localhost:8700`  |
    /// | `PLANNER_API_KEY`      | (unset)                  |
    /// | `PLANNER_API_VERSION`  | `v2`                     |
    /// | `PLANNER_TIMEOUT_SECS` | `60`                     |
    /// | `GATE_MIN`             | `1`                      |
    /// | `GATE_MAX`             | `8`                      |
    /// | `GATE_INITIAL`         | `4`                      |
    /// | `GATE_RELAX_EVERY`     | `10`                     |
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 3000),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
            pool_size: parse_env("POOL_SIZE", 4),
            lock_timeout_secs: parse_env("LOCK_TIMEOUT_SECS", 120),
            max_batches: parse_env("MAX_BATCHES", 30),
            preview_interval_ms: parse_env("PREVIEW_INTERVAL_MS", 500),
            planner_url: env_or("PLANNER_URL", "http://localhost:8700"),
            planner_api_key: std::env::var("PLANNER_API_KEY").ok(),
            planner_version: env_or("PLANNER_API_VERSION", "v2")
                .parse()
                .expect("PLANNER_API_VERSION must be v1 or v2"),
            planner_timeout_secs: parse_env("PLANNER_TIMEOUT_SECS", 60),
            gate_min: parse_env("GATE_MIN", 1),
            gate_max: parse_env("GATE_MAX", 8),
            gate_initial: parse_env("GATE_INITIAL", 4),
            gate_relax_every: parse_env("GATE_RELAX_EVERY", 10),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            pool_size: self.pool_size,
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
            preview_interval: Duration::from_millis(self.preview_interval_ms),
            loop_config: LoopConfig {
                max_batches: self.max_batches,
                ..LoopConfig::default()
            },
            ..OrchestratorConfig::default()
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            min_limit: self.gate_min,
            max_limit: self.gate_max,
            initial_limit: self.gate_initial,
            relax_threshold: self.gate_relax_every,
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            base_url: self.planner_url.clone(),
            api_key: self.planner_api_key.clone(),
            version: self.planner_version,
            timeout: Duration::from_secs(self.planner_timeout_secs),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid value")),
        Err(_) => default,
    }
}
