//! Dataset listing and per-dataset OHLCV lookups (C4 over HTTP).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::ingestion::stock_code::is_valid_stock_code;
use crate::market_store;
use crate::state::AppState;

pub async fn list_datasets(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({ "datasets": state.dataset_router.list_datasets() }))
}

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

pub async fn dataset_stock_ohlcv(
    State(state): State<AppState>,
    Path((name, code)): Path<(String, String)>,
    Query(query): Query<OhlcvQuery>,
) -> Result<Json<Value>, AppError> {
    if !is_valid_stock_code(&code) {
        return Err(AppError::Validation(format!("invalid stock code: {code}")));
    }

    let handle = state
        .dataset_router
        .resolve(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dataset not found: {name}")))?;

    let _guard = handle.lock().await;
    let records = market_store::fetch_stock_ohlcv(
        &handle.pool,
        &code,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )
    .await?;

    if records.is_empty() {
        return Err(AppError::NotFound(format!("no ohlcv data for {code} in {name}")));
    }

    Ok(Json(serde_json::to_value(records).unwrap_or_default()))
}
