//! Shared application state injected into handlers via `axum::Extension`.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::SharedCache;
use crate::config::AppConfig;
use crate::dataset_router::DatasetRouter;
use crate::job::{JobExecutor, JobRegistry};
use crate::rate_limiter::RateLimiter;

/// Cache of TOPIX OHLC responses, keyed by a query-parameter string; the
/// value is the raw JSON body so handlers don't need to know its shape.
pub type TopixCache = SharedCache<serde_json::Value, String>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<JobRegistry>,
    pub executor: Arc<JobExecutor>,
    pub dataset_router: Arc<DatasetRouter>,
    pub rate_limiter: Arc<RateLimiter>,
    pub topix_cache: TopixCache,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(JobRegistry::new(config.job_retention));
        let executor = Arc::new(JobExecutor::new(registry.clone(), default_max_concurrency()));
        let dataset_router = Arc::new(DatasetRouter::new(config.dataset_base_path.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.jquants_plan));
        let topix_cache: TopixCache = Arc::new(crate::cache::ExpiringSingleFlightCache::new());

        Self {
            config: Arc::new(config),
            registry,
            executor,
            dataset_router,
            rate_limiter,
            topix_cache,
        }
    }

    /// Spawn the background task that periodically evicts retained
    /// terminal jobs (spec §4.6). Returns its `JoinHandle` so callers can
    /// abort it on shutdown.
    pub fn spawn_job_gc(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        let interval = self.config.job_gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.cleanup().await;
                if removed > 0 {
                    tracing::info!(removed, "job registry gc pass");
                }
            }
        })
    }
}

fn default_max_concurrency() -> usize {
    std::env::var("JOB_MAX_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4)
}

pub const TOPIX_CACHE_TTL: Duration = Duration::from_secs(300);
