//! marketdata-orchestrator — market-data and backtest orchestration
//! service.
//!
//! Exposes a job control plane (data sync, backtests, optimization,
//! screening) over HTTP, with SSE progress streaming and a read plane over
//! per-dataset embedded SQLite databases.
//!
//! Routes:
//!   GET  /api/health                                  — liveness
//!   POST /api/backtest                                 — create backtest job
//!   POST /api/optimize                                 — create optimization job
//!   POST /api/screening/jobs                           — create screening job
//!   POST /api/db/sync                                  — create sync job
//!   GET  /api/jobs/:id                                  — job snapshot
//!   GET  /api/jobs/:id/events                           — SSE progress stream
//!   POST /api/jobs/:id/cancel                           — request cancellation
//!   GET  /api/datasets                                  — list dataset names
//!   GET  /api/datasets/:name/stocks/:code/ohlcv         — per-dataset OHLCV
//!   GET  /api/market/topix                              — TOPIX OHLC

pub mod cache;
pub mod config;
pub mod correlation;
pub mod dataset_router;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod job;
pub mod market_store;
pub mod rate_limiter;
pub mod router;
pub mod sse;
pub mod state;
