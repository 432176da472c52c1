//! marketdata-orchestrator — market-data and backtest orchestration
//! service.
//!
//! Reads config from env vars (see `config::AppConfig`):
//!   BIND_ADDR, API_BASE_URL, API_TIMEOUT, LOG_LEVEL, JQUANTS_API_KEY,
//!   JQUANTS_PLAN, MARKET_DB_PATH, PORTFOLIO_DB_PATH, DATASET_BASE_PATH,
//!   MARKETDATA_DATA_DIR, JOB_GC_INTERVAL_SECS, JOB_RETENTION_SECS
//!
//! `RUST_LOG`, if set, takes precedence over `LOG_LEVEL` for the tracing
//! filter.

use marketdata_orchestrator::config::AppConfig;
use marketdata_orchestrator::router::build_router;
use marketdata_orchestrator::state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level_filter(&config.log_level)),
        )
        .init();

    let bind_addr = config.bind_addr.clone();

    let state = AppState::new(config);
    let _gc_handle = state.spawn_job_gc();
    tracing::info!("job registry gc loop spawned");

    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {bind_addr}: {e}"));
    tracing::info!("marketdata-orchestrator listening on {bind_addr}");

    axum::serve(listener, app).await.expect("server error");
}

/// Turn `LOG_LEVEL` (spec §6's enumerated, Python-`logging`-style values,
/// e.g. `"WARNING"`) into a `tracing_subscriber::EnvFilter` directive,
/// scoped to this crate so dependency noise stays at `warn`. `RUST_LOG`,
/// checked first by `try_from_default_env` above, always wins.
fn log_level_filter(log_level: &str) -> tracing_subscriber::EnvFilter {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "warning" => "warn",
        other => other,
    }
    .to_string();
    tracing_subscriber::EnvFilter::try_new(format!("warn,marketdata_orchestrator={level}"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}
