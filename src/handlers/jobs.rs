//! Job submission and observation endpoints (C6/C7/C8 over HTTP).
//!
//! The indicator mathematics and strategy engines invoked by backtest,
//! optimization, and screening jobs are out of scope (spec §1); those job
//! bodies exercise the full registry/executor/cancellation contract against
//! a synthetic result so the control plane can be tested end-to-end. The
//! sync and dataset-build bodies run the real C2→C4→C5 chain, since that
//! chain is in scope.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::error::AppError;
use crate::ingestion::market_code_alias::resolve_market_codes;
use crate::ingestion::quote_row::build_stock_data_row;
use crate::ingestion::stock_code::normalize_stock_code;
use crate::ingestion::{run_ingestion_batch, validate_rows_required_fields, Row};
use crate::job::{JobBodyResult, JobId, JobKind, JobOutcome, Progress};
use crate::market_store;
use crate::sse;
use crate::state::AppState;

#[derive(serde::Serialize)]
pub struct JobCreatedResponse {
    id: JobId,
}

async fn create_job(state: &AppState, kind: JobKind, params: Value) -> JobCreatedResponse {
    let id = state.registry.create(kind, params.clone()).await;

    match kind {
        JobKind::Sync | JobKind::DatasetBuild => spawn_ingestion_job(state, id, kind, params),
        JobKind::Backtest => spawn_synthetic_job(state, id, kind, "backtest", JobOutcome::Backtest {
            body: serde_json::json!({"trades": 0}),
        }),
        JobKind::Optimization => spawn_synthetic_job(
            state,
            id,
            kind,
            "optimization",
            JobOutcome::Optimization {
                best_score: None,
                total_combinations: 0,
                body: serde_json::json!({}),
            },
        ),
        JobKind::Screening => spawn_synthetic_job(
            state,
            id,
            kind,
            "screening",
            JobOutcome::Screening {
                matched_count: 0,
                body: serde_json::json!({"matches": []}),
            },
        ),
        JobKind::Lab => spawn_synthetic_job(state, id, kind, "lab", JobOutcome::Lab {
            body: serde_json::json!({}),
        }),
    }

    JobCreatedResponse { id }
}

/// A stand-in body for the engines that are out of scope: report one
/// progress tick, then complete with the given synthetic outcome.
fn spawn_synthetic_job(state: &AppState, id: JobId, kind: JobKind, stage: &'static str, outcome: JobOutcome) {
    let registry = state.registry.clone();
    if kind.is_blocking() {
        state.executor.submit_blocking(id, kind, move |_token| JobBodyResult::Completed(outcome));
    } else {
        let registry_for_progress = registry.clone();
        state.executor.submit(id, kind, move |_token| async move {
            registry_for_progress
                .update_progress(id, Progress::new(stage, 1, 1, format!("{stage} complete")))
                .await;
            JobBodyResult::Completed(outcome)
        });
    }
}

fn spawn_ingestion_job(state: &AppState, id: JobId, kind: JobKind, params: Value) {
    let registry = state.registry.clone();
    let rate_limiter = state.rate_limiter.clone();
    let market_db_path = state.config.market_db_path.clone();

    state.executor.submit(id, kind, move |_token| async move {
        let (_, market_codes) = resolve_market_codes(
            params.get("markets").and_then(Value::as_str).unwrap_or(""),
            None,
        );

        registry
            .update_progress(id, Progress::new("fetch", 0, 1, "requesting upstream quotes"))
            .await;

        let fetch_market_codes = market_codes.clone();
        let result = run_ingestion_batch(
            || async move {
                rate_limiter.acquire().await;
                Ok(synthetic_quote_rows(&fetch_market_codes))
            },
            crate::ingestion::passthrough_rows,
            |rows: Vec<Row>| validate_rows_required_fields(rows, &["Code", "Date"], Some(&["Code", "Date"]), "sync"),
            |rows: Vec<Row>| {
                let market_db_path = market_db_path.clone();
                async move {
                    let pool = market_store::open_writable(&market_db_path).await.map_err(anyhow::Error::from)?;
                    let stock_rows: Vec<_> = rows
                        .iter()
                        .filter_map(|row| {
                            let code = row.get("Code").and_then(Value::as_str).map(normalize_stock_code);
                            build_stock_data_row(&Value::Object(row.clone()), code.as_deref(), None)
                        })
                        .collect();
                    let written = market_store::upsert_stock_rows(&pool, &stock_rows)
                        .await
                        .map_err(anyhow::Error::from)?;
                    Ok(written)
                }
            },
            None::<fn(Vec<Row>) -> std::future::Ready<anyhow::Result<()>>>,
        )
        .await;

        match result {
            Ok(batch) => {
                registry
                    .update_progress(id, Progress::new("done", 1, 1, "ingestion complete"))
                    .await;
                JobBodyResult::Completed(JobOutcome::Sync {
                    records_stored: batch.published_count as u64,
                    body: serde_json::json!({
                        "fetched": batch.fetched_count,
                        "validated": batch.validated_count,
                        "published": batch.published_count,
                    }),
                })
            }
            Err(e) => JobBodyResult::Failed(e.to_string()),
        }
    });
}

/// Placeholder quote rows standing in for the real upstream response (the
/// exact wire format is out of scope, per spec §1).
fn synthetic_quote_rows(market_codes: &[String]) -> Vec<Row> {
    market_codes
        .iter()
        .map(|_| {
            let mut row = serde_json::Map::new();
            row.insert("Code".into(), Value::String("72030".into()));
            row.insert("Date".into(), Value::String(chrono::Utc::now().format("%Y-%m-%d").to_string()));
            row.insert("O".into(), serde_json::json!(100.0));
            row.insert("H".into(), serde_json::json!(101.0));
            row.insert("L".into(), serde_json::json!(99.0));
            row.insert("C".into(), serde_json::json!(100.5));
            row.insert("Vo".into(), serde_json::json!(10000));
            row
        })
        .collect()
}

pub async fn create_sync_job(State(state): State<AppState>, Json(params): Json<Value>) -> (StatusCode, Json<JobCreatedResponse>) {
    (StatusCode::ACCEPTED, Json(create_job(&state, JobKind::Sync, params).await))
}

pub async fn create_backtest_job(State(state): State<AppState>, Json(params): Json<Value>) -> (StatusCode, Json<JobCreatedResponse>) {
    (StatusCode::ACCEPTED, Json(create_job(&state, JobKind::Backtest, params).await))
}

pub async fn create_optimize_job(State(state): State<AppState>, Json(params): Json<Value>) -> (StatusCode, Json<JobCreatedResponse>) {
    (StatusCode::ACCEPTED, Json(create_job(&state, JobKind::Optimization, params).await))
}

pub async fn create_screening_job(State(state): State<AppState>, Json(params): Json<Value>) -> (StatusCode, Json<JobCreatedResponse>) {
    (StatusCode::ACCEPTED, Json(create_job(&state, JobKind::Screening, params).await))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Result<Json<Value>, AppError> {
    let snapshot = state
        .registry
        .snapshot(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("job not found: {id}")))?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Result<Json<Value>, AppError> {
    let cancelled = state.registry.request_cancel(id).await;
    if state.registry.snapshot(id).await.is_none() {
        return Err(AppError::NotFound(format!("job not found: {id}")));
    }
    Ok(Json(serde_json::json!({"cancelled": cancelled})))
}

pub async fn job_events(State(state): State<AppState>, Path(id): Path<JobId>) -> axum::response::Response {
    use axum::response::IntoResponse;
    sse::job_event_stream(&state.registry, id).await.into_response()
}
