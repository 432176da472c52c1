//! Read/write access to the market database's `stock_data` and `topix`
//! tables. Schema and query helpers live outside `dataset_router` (C4)
//! because the market and portfolio databases are always-open singletons
//! rather than name-resolved per-request handles, but they share its
//! read-only-for-readers / single-writer discipline (spec §5): the sync
//! and dataset-build job bodies open one read-write WAL handle, every
//! other caller reads through a read-only pool.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row as SqlxRow, SqlitePool};
use std::path::Path;

use crate::error::AppError;
use crate::ingestion::quote_row::StockDataRow;
use crate::ingestion::stock_code::stock_code_candidates;

pub async fn open_read_only(path: &Path) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(|e| AppError::Internal(format!("failed to open {}: {e}", path.display())))
}

/// Open (creating if necessary) the single read-write handle used by
/// ingestion job bodies: WAL journaling and foreign keys, per spec §5.
pub async fn open_writable(path: &Path) -> Result<SqlitePool, AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Internal(format!("failed to create {}: {e}", parent.display())))?;
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| AppError::Internal(format!("failed to open {}: {e}", path.display())))?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS stock_data (
            code TEXT NOT NULL,
            date TEXT NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            volume INTEGER NOT NULL,
            adjustment_factor REAL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (code, date)
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS topix (
            date TEXT PRIMARY KEY,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(())
}

/// Insert-or-replace a batch of quote rows. Returns the number of rows
/// written.
pub async fn upsert_stock_rows(pool: &SqlitePool, rows: &[StockDataRow]) -> Result<usize, AppError> {
    let mut written = 0usize;
    for row in rows {
        sqlx::query(
            "INSERT INTO stock_data (code, date, open, high, low, close, volume, adjustment_factor, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(code, date) DO UPDATE SET
                open = excluded.open, high = excluded.high, low = excluded.low,
                close = excluded.close, volume = excluded.volume,
                adjustment_factor = excluded.adjustment_factor, created_at = excluded.created_at",
        )
        .bind(&row.code)
        .bind(&row.date)
        .bind(row.open)
        .bind(row.high)
        .bind(row.low)
        .bind(row.close)
        .bind(row.volume)
        .bind(row.adjustment_factor)
        .bind(&row.created_at)
        .execute(pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
        written += 1;
    }
    Ok(written)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OhlcvRecord {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OhlcRecord {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Fetch OHLCV rows for one stock code, querying both the canonical and
/// upstream-expanded candidate codes and merging by date: the canonical
/// (four-character) candidate is queried first, so on a date present under
/// both forms its row wins the tie (spec §3's "four-character preferred on
/// ties").
pub async fn fetch_stock_ohlcv(
    pool: &SqlitePool,
    code: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Vec<OhlcvRecord>, AppError> {
    let mut by_date: indexmap::IndexMap<String, OhlcvRecord> = indexmap::IndexMap::new();
    for candidate in stock_code_candidates(code) {
        for record in query_ohlcv(pool, &candidate, start_date, end_date).await? {
            by_date.entry(record.date.clone()).or_insert(record);
        }
    }
    let mut records: Vec<OhlcvRecord> = by_date.into_values().collect();
    records.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(records)
}

async fn query_ohlcv(
    pool: &SqlitePool,
    code: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Vec<OhlcvRecord>, AppError> {
    let query = match (start_date, end_date) {
        (Some(start), Some(end)) => sqlx::query(
            "SELECT date, open, high, low, close, volume FROM stock_data
             WHERE code = ? AND date >= ? AND date <= ? ORDER BY date ASC",
        )
        .bind(code)
        .bind(start)
        .bind(end),
        (Some(start), None) => sqlx::query(
            "SELECT date, open, high, low, close, volume FROM stock_data
             WHERE code = ? AND date >= ? ORDER BY date ASC",
        )
        .bind(code)
        .bind(start),
        (None, Some(end)) => sqlx::query(
            "SELECT date, open, high, low, close, volume FROM stock_data
             WHERE code = ? AND date <= ? ORDER BY date ASC",
        )
        .bind(code)
        .bind(end),
        (None, None) => sqlx::query(
            "SELECT date, open, high, low, close, volume FROM stock_data
             WHERE code = ? ORDER BY date ASC",
        )
        .bind(code),
    };

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|row| OhlcvRecord {
            date: row.get("date"),
            open: row.get("open"),
            high: row.get("high"),
            low: row.get("low"),
            close: row.get("close"),
            volume: row.get("volume"),
        })
        .collect())
}

pub async fn fetch_topix(
    pool: &SqlitePool,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Vec<OhlcRecord>, AppError> {
    let query = match (start_date, end_date) {
        (Some(start), Some(end)) => sqlx::query(
            "SELECT date, open, high, low, close FROM topix WHERE date >= ? AND date <= ? ORDER BY date ASC",
        )
        .bind(start)
        .bind(end),
        (Some(start), None) => {
            sqlx::query("SELECT date, open, high, low, close FROM topix WHERE date >= ? ORDER BY date ASC")
                .bind(start)
        }
        (None, Some(end)) => {
            sqlx::query("SELECT date, open, high, low, close FROM topix WHERE date <= ? ORDER BY date ASC")
                .bind(end)
        }
        (None, None) => sqlx::query("SELECT date, open, high, low, close FROM topix ORDER BY date ASC"),
    };

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|row| OhlcRecord {
            date: row.get("date"),
            open: row.get("open"),
            high: row.get("high"),
            low: row.get("low"),
            close: row.get("close"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp_writable(dir: &tempfile::TempDir) -> SqlitePool {
        open_writable(&dir.path().join("market.db")).await.unwrap()
    }

    #[tokio::test]
    async fn ohlcv_merges_canonical_and_expanded_candidates_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_temp_writable(&dir).await;

        // Canonical code holds one date; the upstream-expanded form of the
        // same stock holds a different date. Both should surface, in order.
        upsert_stock_rows(
            &pool,
            &[
                crate::ingestion::quote_row::StockDataRow {
                    code: "131A".to_string(),
                    date: "2026-01-02".to_string(),
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.5,
                    volume: 100,
                    adjustment_factor: None,
                    created_at: "2026-01-02T00:00:00Z".to_string(),
                },
                crate::ingestion::quote_row::StockDataRow {
                    code: "131A0".to_string(),
                    date: "2026-01-03".to_string(),
                    open: 20.0,
                    high: 21.0,
                    low: 19.0,
                    close: 20.5,
                    volume: 200,
                    adjustment_factor: None,
                    created_at: "2026-01-03T00:00:00Z".to_string(),
                },
            ],
        )
        .await
        .unwrap();

        let records = fetch_stock_ohlcv(&pool, "131A0", None, None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2026-01-02");
        assert_eq!(records[1].date, "2026-01-03");
    }

    #[tokio::test]
    async fn ohlcv_prefers_canonical_row_on_date_tie() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_temp_writable(&dir).await;

        upsert_stock_rows(
            &pool,
            &[
                crate::ingestion::quote_row::StockDataRow {
                    code: "131A".to_string(),
                    date: "2026-01-02".to_string(),
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.5,
                    volume: 100,
                    adjustment_factor: None,
                    created_at: "2026-01-02T00:00:00Z".to_string(),
                },
                crate::ingestion::quote_row::StockDataRow {
                    code: "131A0".to_string(),
                    date: "2026-01-02".to_string(),
                    open: 999.0,
                    high: 999.0,
                    low: 999.0,
                    close: 999.0,
                    volume: 999,
                    adjustment_factor: None,
                    created_at: "2026-01-02T00:00:00Z".to_string(),
                },
            ],
        )
        .await
        .unwrap();

        let records = fetch_stock_ohlcv(&pool, "131A", None, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].open, 10.0);
    }
}
