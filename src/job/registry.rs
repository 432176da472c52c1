//! The job control plane (C6, spec §4.6): create/track/cancel/clean-up of
//! asynchronous jobs and their broadcast to SSE subscribers. Grounded in
//! the original service's in-memory job manager and `schemas/job.py`'s
//! status transitions, re-cast as a registry generic over the terminal
//! result type so kinds can't be confused with each other at compile time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::subscription::{Frame, Subscription, DEFAULT_QUEUE_CAPACITY};
use super::types::{JobId, JobKind, JobOutcome, JobStatus, Progress};

pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub outcome: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_token: CancellationToken,
    subscribers: Vec<Arc<Subscription>>,
}

impl JobRecord {
    fn broadcast(&mut self, data: Option<serde_json::Value>) {
        let frame = Frame {
            status: self.status,
            progress: self.progress.clone(),
            message: self.message.clone(),
            data,
        };
        self.subscribers.retain(|sub| {
            sub.push(frame.clone());
            true
        });
    }
}

/// A point-in-time view of a job, suitable for the `GET /api/jobs/{id}`
/// snapshot response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub outcome: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobSnapshot {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            status: record.status,
            progress: record.progress.clone(),
            message: record.message.clone(),
            error: record.error.clone(),
            outcome: record.outcome.clone(),
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<JobRecord>>>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub async fn create(&self, kind: JobKind, params: serde_json::Value) -> JobId {
        let id = uuid::Uuid::new_v4();
        let record = JobRecord {
            id,
            kind,
            params,
            status: JobStatus::Pending,
            progress: None,
            message: None,
            error: None,
            outcome: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancel_token: CancellationToken::new(),
            subscribers: Vec::new(),
        };
        self.jobs.write().await.insert(id, Arc::new(RwLock::new(record)));
        id
    }

    async fn record(&self, id: JobId) -> Option<Arc<RwLock<JobRecord>>> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let record = self.record(id).await?;
        let record = record.read().await;
        Some(JobSnapshot::from(&*record))
    }

    pub async fn cancel_token(&self, id: JobId) -> Option<CancellationToken> {
        let record = self.record(id).await?;
        let record = record.read().await;
        Some(record.cancel_token.clone())
    }

    pub async fn mark_running(&self, id: JobId) {
        if let Some(record) = self.record(id).await {
            let mut record = record.write().await;
            record.status = JobStatus::Running;
            record.started_at = Some(Utc::now());
            record.broadcast(None);
        }
    }

    pub async fn update_progress(&self, id: JobId, progress: Progress) {
        if let Some(record) = self.record(id).await {
            let mut record = record.write().await;
            if record.status.is_terminal() {
                return;
            }
            record.message = Some(progress.message.clone());
            record.progress = Some(progress);
            record.broadcast(None);
        }
    }

    /// Transition a job to a terminal state. A no-op if already terminal —
    /// the first terminal transition wins.
    pub async fn complete(&self, id: JobId, status: JobStatus, outcome: Option<JobOutcome>, error: Option<String>) {
        debug_assert!(status.is_terminal());
        if let Some(record) = self.record(id).await {
            let mut record = record.write().await;
            if record.status.is_terminal() {
                return;
            }
            record.status = status;
            record.outcome = outcome.clone();
            record.error = error.clone();
            record.completed_at = Some(Utc::now());
            let data = outcome.as_ref().map(|o| serde_json::to_value(o).unwrap_or_default());
            record.broadcast(data);
        }
    }

    /// Request cooperative cancellation. The executor observes the token;
    /// the terminal transition to `Cancelled` happens once it unwinds.
    pub async fn request_cancel(&self, id: JobId) -> bool {
        match self.record(id).await {
            Some(record) => {
                let record = record.read().await;
                if record.status.is_terminal() {
                    false
                } else {
                    record.cancel_token.cancel();
                    true
                }
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, id: JobId) -> Option<Arc<Subscription>> {
        let record = self.record(id).await?;
        let mut record = record.write().await;
        let sub = Arc::new(Subscription::new(DEFAULT_QUEUE_CAPACITY));
        // A late subscriber to an already-terminal job should still observe
        // the final frame once, then close.
        sub.push(Frame {
            status: record.status,
            progress: record.progress.clone(),
            message: record.message.clone(),
            data: record
                .outcome
                .as_ref()
                .map(|o| serde_json::to_value(o).unwrap_or_default()),
        });
        if !record.status.is_terminal() {
            record.subscribers.push(sub.clone());
        }
        Some(sub)
    }

    /// Drop terminal jobs older than the configured retention window.
    /// Intended to run on a periodic background tick (spec §4.6).
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::zero());
        let mut jobs = self.jobs.write().await;
        let mut removed = 0usize;
        let stale: Vec<JobId> = {
            let mut stale = Vec::new();
            for (id, record) in jobs.iter() {
                let record = record.read().await;
                if record.status.is_terminal() && record.completed_at.map(|t| t < cutoff).unwrap_or(false) {
                    stale.push(*id);
                }
            }
            stale
        };
        for id in stale {
            jobs.remove(&id);
            removed += 1;
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_snapshot_reflects_pending_status() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn subscriber_observes_progress_then_terminal_then_closes() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        let sub = registry.subscribe(id).await.unwrap();
        // initial late-subscribe snapshot frame (pending)
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Pending);

        registry.mark_running(id).await;
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Running);

        registry
            .update_progress(id, Progress::new("fetch", 1, 2, "halfway"))
            .await;
        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.status, JobStatus::Running);
        assert_eq!(frame.progress.unwrap().current, 1);

        registry
            .complete(id, JobStatus::Completed, None, None)
            .await;
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Completed);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn completing_twice_keeps_first_terminal_status() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        registry
            .complete(id, JobStatus::Failed, None, Some("boom".into()))
            .await;
        registry.complete(id, JobStatus::Completed, None, None).await;
        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancel_request_is_idempotent_and_fails_after_terminal() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        assert!(registry.request_cancel(id).await);
        registry.complete(id, JobStatus::Cancelled, None, None).await;
        assert!(!registry.request_cancel(id).await);
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_terminal_jobs() {
        let registry = JobRegistry::new(Duration::from_secs(0));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        let still_pending = registry.create(JobKind::Sync, serde_json::json!({})).await;
        registry.complete(id, JobStatus::Completed, None, None).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = registry.cleanup().await;
        assert_eq!(removed, 1);
        assert!(registry.snapshot(id).await.is_none());
        assert!(registry.snapshot(still_pending).await.is_some());
    }
}
