//! Data-access router (C4).
//!
//! Resolves a human-supplied dataset name to a read-only SQLite handle, with
//! path-traversal defence and per-process handle caching. Mirrors
//! `DatasetResolver` in the original service: name validation + `.db`
//! normalization, symlink-resolved prefix check against the base directory,
//! a global mutex guarding cache mutation, and a per-handle mutex for query
//! serialization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::error::AppError;

fn name_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// A cached, read-only handle onto one dataset's SQLite file.
pub struct DatasetHandle {
    pub pool: SqlitePool,
    pub path: PathBuf,
    query_lock: Mutex<()>,
}

impl DatasetHandle {
    async fn open(path: &Path) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Internal(format!("failed to open dataset: {e}")))?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
            query_lock: Mutex::new(()),
        })
    }

    /// Serializes queries against this handle the way the per-handle mutex
    /// in the original resolver does, so concurrent readers on one dataset
    /// don't race each other's cursor state.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.query_lock.lock().await
    }
}

pub struct DatasetRouter {
    base_path: PathBuf,
    cache: Mutex<HashMap<String, Arc<DatasetHandle>>>,
}

impl DatasetRouter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        let canonical = std::fs::canonicalize(&base_path).unwrap_or(base_path);
        Self {
            base_path: canonical,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Validate `name`, strip/append `.db`, and reject path traversal.
    /// Returns the normalized `"<name>.db"` filename.
    fn validate_name(&self, name: &str) -> Result<String, AppError> {
        let stem = name.strip_suffix(".db").unwrap_or(name);
        if stem.is_empty() || !name_pattern().is_match(stem) {
            return Err(AppError::Validation(format!(
                "invalid dataset name: {name}"
            )));
        }
        let normalized = format!("{stem}.db");
        let candidate = self.base_path.join(&normalized);
        let canonical = std::fs::canonicalize(&candidate).unwrap_or(candidate);
        let expected_prefix = format!("{}{}", self.base_path.display(), std::path::MAIN_SEPARATOR);
        if !canonical.display().to_string().starts_with(&expected_prefix) {
            return Err(AppError::Validation(format!(
                "path traversal detected: {name}"
            )));
        }
        Ok(normalized)
    }

    /// The validated absolute path for `name`, independent of whether the
    /// file exists.
    pub fn db_path(&self, name: &str) -> Result<PathBuf, AppError> {
        let normalized = self.validate_name(name)?;
        Ok(self.base_path.join(normalized))
    }

    /// Resolve `name` to a cached handle. Returns `Ok(None)` if the name is
    /// well-formed but the file doesn't exist.
    pub async fn resolve(&self, name: &str) -> Result<Option<Arc<DatasetHandle>>, AppError> {
        let normalized = self.validate_name(name)?;
        let path = self.base_path.join(&normalized);
        if !path.exists() {
            return Ok(None);
        }

        let mut cache = self.cache.lock().await;
        if let Some(handle) = cache.get(&normalized) {
            return Ok(Some(handle.clone()));
        }
        let handle = Arc::new(DatasetHandle::open(&path).await?);
        cache.insert(normalized, handle.clone());
        Ok(Some(handle))
    }

    /// List available dataset names (without the `.db` extension).
    pub fn list_datasets(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.base_path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                let stem = name.strip_suffix(".db")?;
                name_pattern().is_match(stem).then(|| stem.to_string())
            })
            .collect();
        names.sort();
        names
    }

    /// Remove a dataset from the cache, closing its handle.
    pub async fn evict(&self, name: &str) -> Result<(), AppError> {
        let normalized = self.validate_name(name)?;
        let handle = {
            let mut cache = self.cache.lock().await;
            cache.remove(&normalized)
        };
        if let Some(handle) = handle {
            let _guard = handle.lock().await;
            handle.pool.close().await;
        }
        Ok(())
    }

    /// Close every cached handle. Called on shutdown.
    pub async fn close_all(&self) {
        let mut cache = self.cache.lock().await;
        for (_, handle) in cache.drain() {
            handle.pool.close().await;
        }
    }
}
