//! Quote row builder: maps a raw upstream daily-quote object to the storage
//! schema, skipping rows whose required fields or OHLCV components are
//! missing or non-finite. Mirrors `build_stock_data_row` in the original
//! service.

use chrono::Utc;
use serde_json::Value;

use super::stock_code::normalize_stock_code;

#[derive(Debug, Clone, PartialEq)]
pub struct StockDataRow {
    pub code: String,
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub adjustment_factor: Option<f64>,
    pub created_at: String,
}

fn pick_first<'a>(quote: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| quote.get(key).filter(|v| !v.is_null()))
}

fn coerce_date(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Booleans and non-parseable strings are rejected as non-numeric;
/// non-finite numbers are rejected.
fn coerce_float(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    match value {
        Value::Bool(_) => None,
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

fn coerce_int(value: Option<&Value>) -> Option<i64> {
    coerce_float(value).map(|f| f as i64)
}

/// Build a storage row from one raw quote object. Returns `None` when the
/// code/date are missing, or any OHLCV component (after the documented
/// fallback order `AdjO,O / AdjH,H / AdjL,L / AdjC,C / AdjVo,Vo`) is missing
/// or non-finite.
pub fn build_stock_data_row(
    quote: &Value,
    normalized_code: Option<&str>,
    created_at: Option<&str>,
) -> Option<StockDataRow> {
    let raw_code = normalized_code
        .map(str::to_string)
        .or_else(|| quote.get("Code").and_then(Value::as_str).map(normalize_stock_code))
        .unwrap_or_default();
    if raw_code.is_empty() {
        return None;
    }

    let date = coerce_date(quote.get("Date"))?;

    let open = coerce_float(pick_first(quote, &["AdjO", "O"]))?;
    let high = coerce_float(pick_first(quote, &["AdjH", "H"]))?;
    let low = coerce_float(pick_first(quote, &["AdjL", "L"]))?;
    let close = coerce_float(pick_first(quote, &["AdjC", "C"]))?;
    let volume = coerce_int(pick_first(quote, &["AdjVo", "Vo"]))?;

    let adjustment_factor = match quote.get("AdjFactor") {
        Some(Value::String(s)) if s.trim().is_empty() => None,
        other => coerce_float(other),
    };

    Some(StockDataRow {
        code: raw_code,
        date,
        open,
        high,
        low,
        close,
        volume,
        adjustment_factor,
        created_at: created_at
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_incomplete_rows_and_normalizes_code() {
        let incomplete = json!({
            "Code": "131A0", "Date": "2026-02-10",
            "O": null, "H": null, "L": null, "C": null, "Vo": null,
        });
        assert!(build_stock_data_row(&incomplete, None, None).is_none());

        let complete = json!({
            "Code": "131A0", "Date": "2026-02-10",
            "O": 100, "H": 102, "L": 99, "C": 101, "Vo": 12345,
        });
        let row = build_stock_data_row(&complete, None, None).unwrap();
        assert_eq!(row.code, "131A");
        assert_eq!(row.open, 100.0);
        assert_eq!(row.volume, 12345);
    }

    #[test]
    fn prefers_adjusted_fields_over_raw() {
        let quote = json!({
            "Code": "7203", "Date": "2026-01-01",
            "AdjO": 10.5, "O": 99.0,
            "AdjH": 11.0, "H": 99.0,
            "AdjL": 9.5, "L": 99.0,
            "AdjC": 10.8, "C": 99.0,
            "AdjVo": 500, "Vo": 999,
        });
        let row = build_stock_data_row(&quote, None, None).unwrap();
        assert_eq!(row.open, 10.5);
        assert_eq!(row.volume, 500);
    }

    #[test]
    fn rejects_boolean_and_non_numeric_strings() {
        let quote = json!({
            "Code": "7203", "Date": "2026-01-01",
            "O": true, "H": 1.0, "L": 1.0, "C": 1.0, "Vo": 1,
        });
        assert!(build_stock_data_row(&quote, None, None).is_none());

        let quote2 = json!({
            "Code": "7203", "Date": "2026-01-01",
            "O": "not-a-number", "H": 1.0, "L": 1.0, "C": 1.0, "Vo": 1,
        });
        assert!(build_stock_data_row(&quote2, None, None).is_none());
    }

    #[test]
    fn empty_adjustment_factor_string_coerces_to_none() {
        let quote = json!({
            "Code": "7203", "Date": "2026-01-01",
            "O": 1.0, "H": 1.0, "L": 1.0, "C": 1.0, "Vo": 1,
            "AdjFactor": "",
        });
        let row = build_stock_data_row(&quote, None, None).unwrap();
        assert_eq!(row.adjustment_factor, None);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let quote = json!({
            "Code": "7203", "Date": "2026-01-01",
            "O": "NaN", "H": 1.0, "L": 1.0, "C": 1.0, "Vo": 1,
        });
        assert!(build_stock_data_row(&quote, None, None).is_none());
    }
}
