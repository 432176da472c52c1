//! Router construction (C9). Built the way the teacher splits route groups
//! and merges them, though this service has no JWT layer (spec §6): every
//! route here is public, and the per-handler dependencies are injected via
//! typed `State<AppState>` rather than `Extension`. The correlation/logging
//! middleware is layered on top exactly as `request_logger_middleware`
//! wraps `correlation_middleware`, outermost first.

use axum::routing::{get, post};
use axum::{middleware as axum_mw, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::correlation::{correlation_middleware, request_logger_middleware};
use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let jobs = Router::new()
        .route("/api/backtest", post(handlers::jobs::create_backtest_job))
        .route("/api/optimize", post(handlers::jobs::create_optimize_job))
        .route("/api/screening/jobs", post(handlers::jobs::create_screening_job))
        .route("/api/db/sync", post(handlers::jobs::create_sync_job))
        .route("/api/jobs/:id", get(handlers::jobs::get_job))
        .route("/api/jobs/:id/events", get(handlers::jobs::job_events))
        .route("/api/jobs/:id/cancel", post(handlers::jobs::cancel_job));

    let data_access = Router::new()
        .route("/api/datasets", get(handlers::datasets::list_datasets))
        .route(
            "/api/datasets/:name/stocks/:code/ohlcv",
            get(handlers::datasets::dataset_stock_ohlcv),
        )
        .route("/api/market/topix", get(handlers::market::topix));

    let health = Router::new().route("/api/health", get(handlers::health::health));

    health
        .merge(jobs)
        .merge(data_access)
        .with_state(state)
        .layer(axum_mw::from_fn(request_logger_middleware))
        .layer(axum_mw::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
