//! Core job data model (spec §3): status, progress, kind, and the
//! terminal-outcome sum type.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type JobId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Sync,
    DatasetBuild,
    Backtest,
    Optimization,
    Screening,
    Lab,
}

impl JobKind {
    /// Kind-specific hard timeout (spec §4.7). Sync defaults to 35 minutes;
    /// other kinds use a shorter budget since they don't make outbound
    /// rate-limited calls.
    pub fn timeout(self) -> std::time::Duration {
        use std::time::Duration;
        match self {
            JobKind::Sync | JobKind::DatasetBuild => Duration::from_secs(35 * 60),
            JobKind::Backtest => Duration::from_secs(15 * 60),
            JobKind::Optimization => Duration::from_secs(30 * 60),
            JobKind::Screening => Duration::from_secs(10 * 60),
            JobKind::Lab => Duration::from_secs(20 * 60),
        }
    }

    /// Whether this kind's body is expected to block the scheduler (calls
    /// into numeric engines) and should be dispatched to a blocking worker
    /// thread instead of run cooperatively.
    pub fn is_blocking(self) -> bool {
        matches!(self, JobKind::Backtest | JobKind::Optimization | JobKind::Screening)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub stage: String,
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn new(stage: impl Into<String>, current: u64, total: u64, message: impl Into<String>) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            stage: stage.into(),
            current,
            total,
            percentage,
            message: message.into(),
        }
    }
}

/// Kind-specific raw result payload, set at most once before the terminal
/// transition is observed by subscribers. Exact per-kind HTTP schemas are
/// out of scope (spec §1); each variant carries a free-form JSON body
/// alongside the couple of summary fields relevant to every caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobOutcome {
    Sync {
        records_stored: u64,
        body: serde_json::Value,
    },
    DatasetBuild {
        records_stored: u64,
        body: serde_json::Value,
    },
    Backtest {
        body: serde_json::Value,
    },
    Optimization {
        best_score: Option<f64>,
        total_combinations: u64,
        body: serde_json::Value,
    },
    Screening {
        matched_count: u64,
        body: serde_json::Value,
    },
    Lab {
        body: serde_json::Value,
    },
}
