//! Ingestion pipeline (C5): the fixed `fetch -> normalize -> validate ->
//! publish -> index` stage runner shared by sync and dataset-build jobs.
//! Mirrors `run_ingestion_batch` / `validate_rows_required_fields` in the
//! original service.

pub mod market_code_alias;
pub mod quote_row;
pub mod stock_code;

use std::collections::HashSet;
use std::future::Future;

use serde_json::Value;

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone)]
pub struct IngestionBatchResult {
    pub fetched_count: usize,
    pub normalized_count: usize,
    pub validated_count: usize,
    pub published_count: usize,
    pub rows: Vec<Row>,
}

/// Run one batch through the five stages. `index`, when present, always
/// runs over the validated rows; `publish` is skipped (and reports 0) when
/// there is nothing to publish.
pub async fn run_ingestion_batch<Fetch, FetchFut, Normalize, Validate, Publish, PublishFut, Index, IndexFut>(
    fetch: Fetch,
    normalize: Normalize,
    validate: Validate,
    publish: Publish,
    index: Option<Index>,
) -> anyhow::Result<IngestionBatchResult>
where
    Fetch: FnOnce() -> FetchFut,
    FetchFut: Future<Output = anyhow::Result<Vec<Row>>>,
    Normalize: FnOnce(Vec<Row>) -> Vec<Row>,
    Validate: FnOnce(Vec<Row>) -> Vec<Row>,
    Publish: FnOnce(Vec<Row>) -> PublishFut,
    PublishFut: Future<Output = anyhow::Result<usize>>,
    Index: FnOnce(Vec<Row>) -> IndexFut,
    IndexFut: Future<Output = anyhow::Result<()>>,
{
    let fetched_rows = fetch().await?;
    let fetched_count = fetched_rows.len();

    let normalized_rows = normalize(fetched_rows);
    let normalized_count = normalized_rows.len();

    let validated_rows = validate(normalized_rows);
    let validated_count = validated_rows.len();

    let published_count = if validated_rows.is_empty() {
        0
    } else {
        publish(validated_rows.clone()).await?
    };

    if let Some(index) = index {
        index(validated_rows.clone()).await?;
    }

    Ok(IngestionBatchResult {
        fetched_count,
        normalized_count,
        validated_count,
        published_count,
        rows: validated_rows,
    })
}

pub fn passthrough_rows(rows: Vec<Row>) -> Vec<Row> {
    rows
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn build_row_key(row: &Row, keys: &[&str]) -> Option<Vec<String>> {
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        let value = row.get(*key);
        if is_missing(value) {
            return None;
        }
        values.push(value_to_string(value.unwrap()));
    }
    Some(values)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Required-field presence check followed by optional dedup-key filtering.
/// A field is "missing" if null or a string whose trimmed form is empty.
/// Dedup keys are joined left-to-right into a tuple of stringified values;
/// the first occurrence wins. Both filtered classes are counted and logged
/// at warning level with the stage name and keys.
pub fn validate_rows_required_fields(
    rows: Vec<Row>,
    required_fields: &[&str],
    dedupe_keys: Option<&[&str]>,
    stage: &str,
) -> Vec<Row> {
    let mut valid_rows = Vec::with_capacity(rows.len());
    let mut missing_count = 0usize;

    for row in rows {
        let missing = required_fields
            .iter()
            .any(|field| is_missing(row.get(*field)));
        if missing {
            missing_count += 1;
            continue;
        }
        valid_rows.push(row);
    }

    if missing_count > 0 {
        tracing::warn!(
            stage,
            missing_count,
            required_fields = ?required_fields,
            "skipped rows with missing required fields"
        );
    }

    let Some(dedupe_keys) = dedupe_keys else {
        return valid_rows;
    };

    let mut deduped = Vec::with_capacity(valid_rows.len());
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut duplicate_count = 0usize;

    for row in valid_rows {
        match build_row_key(&row, dedupe_keys) {
            None => duplicate_count += 1,
            Some(key) if seen.contains(&key) => duplicate_count += 1,
            Some(key) => {
                seen.insert(key);
                deduped.push(row);
            }
        }
    }

    if duplicate_count > 0 {
        tracing::warn!(
            stage,
            duplicate_count,
            dedupe_keys = ?dedupe_keys,
            "removed duplicate rows"
        );
    }

    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(code: Option<&str>, date: &str, v: i64) -> Row {
        let mut m = serde_json::Map::new();
        if let Some(code) = code {
            m.insert("code".into(), json!(code));
        } else {
            m.insert("code".into(), Value::Null);
        }
        m.insert("date".into(), json!(date));
        m.insert("v".into(), json!(v));
        m
    }

    #[test]
    fn dedup_and_required_field_filtering() {
        let rows = vec![
            row(Some("7203"), "2024-01-04", 1),
            row(Some("7203"), "2024-01-04", 2),
            row(None, "2024-01-04", 3),
        ];
        let validated =
            validate_rows_required_fields(rows, &["code", "date"], Some(&["code", "date"]), "sync");
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0]["v"], 1);
    }

    #[tokio::test]
    async fn publish_skipped_when_nothing_validated() {
        let result = run_ingestion_batch(
            || async { Ok(vec![row(None, "2024-01-01", 1)]) },
            passthrough_rows,
            |rows| validate_rows_required_fields(rows, &["code"], None, "test"),
            |rows: Vec<Row>| async move { Ok(rows.len()) },
            None::<fn(Vec<Row>) -> std::future::Ready<anyhow::Result<()>>>,
        )
        .await
        .unwrap();

        assert_eq!(result.fetched_count, 1);
        assert_eq!(result.validated_count, 0);
        assert_eq!(result.published_count, 0);
    }

    #[tokio::test]
    async fn index_runs_over_validated_rows() {
        let indexed = std::sync::Arc::new(std::sync::Mutex::new(0usize));
        let indexed_clone = indexed.clone();

        let result = run_ingestion_batch(
            || async { Ok(vec![row(Some("7203"), "2024-01-01", 1)]) },
            passthrough_rows,
            |rows| validate_rows_required_fields(rows, &["code"], None, "test"),
            |rows: Vec<Row>| async move { Ok(rows.len()) },
            Some(move |rows: Vec<Row>| {
                *indexed_clone.lock().unwrap() = rows.len();
                std::future::ready(Ok(()))
            }),
        )
        .await
        .unwrap();

        assert_eq!(result.published_count, 1);
        assert_eq!(*indexed.lock().unwrap(), 1);
    }
}
