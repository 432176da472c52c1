//! Job executor pool (C7, spec §4.7): bounds how many jobs run at once with
//! a global semaphore, applies a kind-dependent hard timeout, and maps the
//! body's outcome onto the registry's terminal transition. Blocking bodies
//! (backtest/optimization/screening, which call into numeric engines) run
//! on `spawn_blocking`; everything else runs cooperatively on the runtime.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::registry::JobRegistry;
use super::types::{JobId, JobKind, JobOutcome, JobStatus};

/// What a job body reports back to the executor once it finishes.
pub enum JobBodyResult {
    Completed(JobOutcome),
    Failed(String),
}

pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    permits: Arc<Semaphore>,
}

impl JobExecutor {
    pub fn new(registry: Arc<JobRegistry>, max_concurrency: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Spawn `body` under the pool's concurrency cap, the job kind's
    /// timeout, and cancellation via the job's token. `body` receives the
    /// job's cancellation token so cooperative bodies can poll it between
    /// steps; the outer race against `cancel_token.cancelled()` handles the
    /// case where the body never checks.
    pub fn submit<F, Fut>(&self, id: JobId, kind: JobKind, body: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = JobBodyResult> + Send + 'static,
    {
        let registry = self.registry.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore never closes");
            let cancel_token = match registry.cancel_token(id).await {
                Some(token) => token,
                None => return,
            };

            registry.mark_running(id).await;

            let timeout = kind.timeout();
            let run = body(cancel_token.clone());

            let outcome = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                result = tokio::time::timeout(timeout, run) => Some(result),
            };

            match outcome {
                None => {
                    registry.complete(id, JobStatus::Cancelled, None, None).await;
                }
                Some(Err(_elapsed)) => {
                    registry
                        .complete(id, JobStatus::Failed, None, Some("timed out".to_string()))
                        .await;
                }
                Some(Ok(JobBodyResult::Completed(result))) => {
                    registry.complete(id, JobStatus::Completed, Some(result), None).await;
                }
                Some(Ok(JobBodyResult::Failed(message))) => {
                    registry.complete(id, JobStatus::Failed, None, Some(message)).await;
                }
            }
        });
    }

    /// Run a blocking body (spec §4.7's `is_blocking` kinds) on a blocking
    /// worker thread, keeping the same concurrency/timeout/cancel contract
    /// as `submit`.
    pub fn submit_blocking<F>(&self, id: JobId, kind: JobKind, body: F)
    where
        F: FnOnce(CancellationToken) -> JobBodyResult + Send + 'static,
    {
        debug_assert!(kind.is_blocking());
        self.submit(id, kind, move |token| async move {
            let token_for_blocking = token.clone();
            match tokio::task::spawn_blocking(move || body(token_for_blocking)).await {
                Ok(result) => result,
                Err(_join_error) => JobBodyResult::Failed("job worker thread panicked".to_string()),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::types::JobOutcome;
    use std::time::Duration;

    #[tokio::test]
    async fn completed_body_transitions_job_to_completed() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        let executor = JobExecutor::new(registry.clone(), 4);

        executor.submit(id, JobKind::Sync, |_token| async move {
            JobBodyResult::Completed(JobOutcome::Sync {
                records_stored: 3,
                body: serde_json::json!({"ok": true}),
            })
        });

        for _ in 0..50 {
            if registry.snapshot(id).await.unwrap().status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.snapshot(id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancelling_before_body_finishes_marks_job_cancelled() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let id = registry.create(JobKind::Sync, serde_json::json!({})).await;
        let executor = JobExecutor::new(registry.clone(), 4);

        executor.submit(id, JobKind::Sync, |token| async move {
            token.cancelled().await;
            JobBodyResult::Failed("should not be observed".to_string())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.request_cancel(id).await;

        for _ in 0..50 {
            if registry.snapshot(id).await.unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.snapshot(id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn failed_body_carries_error_message() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let id = registry.create(JobKind::Screening, serde_json::json!({})).await;
        let executor = JobExecutor::new(registry.clone(), 2);

        executor.submit_blocking(id, JobKind::Screening, |_token| {
            JobBodyResult::Failed("bad filter expression".to_string())
        });

        for _ in 0..50 {
            if registry.snapshot(id).await.unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("bad filter expression"));
    }
}
