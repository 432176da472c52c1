//! `GET /api/market/topix` — TOPIX OHLC series, read through the
//! expiring single-flight cache (C3) keyed by the date-range query.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::market_store;
use crate::state::{AppState, TOPIX_CACHE_TTL};

#[derive(Debug, Deserialize)]
pub struct TopixQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

pub async fn topix(State(state): State<AppState>, Query(query): Query<TopixQuery>) -> Result<Json<Value>, AppError> {
    let cache_key = format!(
        "topix:{}:{}",
        query.start_date.as_deref().unwrap_or(""),
        query.end_date.as_deref().unwrap_or("")
    );

    let market_db_path = state.config.market_db_path.clone();
    let start_date = query.start_date.clone();
    let end_date = query.end_date.clone();

    let (value, _outcome) = state
        .topix_cache
        .get_or_set(&cache_key, TOPIX_CACHE_TTL, || async move {
            let pool = market_store::open_read_only(&market_db_path)
                .await
                .map_err(|e| e.to_string())?;
            let records = market_store::fetch_topix(&pool, start_date.as_deref(), end_date.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            Ok::<Value, String>(serde_json::to_value(records).unwrap_or_default())
        })
        .await
        .map_err(|_| AppError::NotFound("market database not found or TOPIX data not available".to_string()))?;

    match value.as_array() {
        Some(records) if !records.is_empty() => Ok(Json(value.clone())),
        _ => Err(AppError::NotFound("TOPIX data not available".to_string())),
    }
}
