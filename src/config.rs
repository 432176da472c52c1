//! Process configuration.
//!
//! Reads config from env vars:
//!   API_BASE_URL, API_TIMEOUT        — upstream base URL and timeout
//!   LOG_LEVEL                        — default "warning"
//!   JQUANTS_API_KEY, JQUANTS_PLAN    — upstream credentials and rate class
//!   MARKET_DB_PATH, PORTFOLIO_DB_PATH, DATASET_BASE_PATH — storage locations
//!   MARKETDATA_DATA_DIR              — data root for defaulting the three paths above
//!   BIND_ADDR                        — listen address (default: 0.0.0.0:8080)
//!   JOB_GC_INTERVAL_SECS, JOB_RETENTION_SECS — registry cleanup cadence

use std::path::PathBuf;
use std::time::Duration;

const SERVICE_NAME: &str = "marketdata-orchestrator";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_base_url: String,
    pub api_timeout: Duration,
    pub log_level: String,
    pub jquants_api_key: Option<String>,
    pub jquants_plan: String,
    pub market_db_path: PathBuf,
    pub portfolio_db_path: PathBuf,
    pub dataset_base_path: PathBuf,
    pub job_gc_interval: Duration,
    pub job_retention: Duration,
}

impl AppConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("MARKETDATA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let market_db_path = env_path("MARKET_DB_PATH", data_dir.join("market.db"));
        let portfolio_db_path = env_path("PORTFOLIO_DB_PATH", data_dir.join("portfolio.db"));
        let dataset_base_path = env_path("DATASET_BASE_PATH", data_dir.join("datasets"));

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "https://api.jquants.com/v1".into()),
            api_timeout: Duration::from_secs(
                std::env::var("API_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warning".into()),
            jquants_api_key: std::env::var("JQUANTS_API_KEY").ok(),
            jquants_plan: std::env::var("JQUANTS_PLAN").unwrap_or_else(|_| "free".into()),
            market_db_path,
            portfolio_db_path,
            dataset_base_path,
            job_gc_interval: Duration::from_secs(
                std::env::var("JOB_GC_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            job_retention: Duration::from_secs(
                std::env::var("JOB_RETENTION_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(24 * 3600),
            ),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(SERVICE_NAME)
}
