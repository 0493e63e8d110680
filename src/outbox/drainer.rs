//! Outbox polling loop

use crate::error::AppError;
use crate::models::OutboxJob;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Storage side of the outbox
pub trait OutboxQueue: Send + Sync {
    /// Move up to `limit` pending jobs to processing and return them
    fn claim_batch(
        &self,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<OutboxJob>, AppError>> + Send;

    fn mark_done(&self, id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn mark_error(
        &self,
        id: Uuid,
        message: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Runs a single claimed job
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &OutboxJob) -> impl Future<Output = Result<(), AppError>> + Send;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Claim one batch and execute its jobs in order
pub async fn drain_once<Q, E>(queue: &Q, executor: &E, batch_size: i64) -> Result<DrainReport, AppError>
where
    Q: OutboxQueue,
    E: JobExecutor,
{
    let jobs = queue.claim_batch(batch_size).await?;
    let mut report = DrainReport {
        claimed: jobs.len(),
        ..DrainReport::default()
    };

    for job in &jobs {
        match executor.execute(job).await {
            Ok(()) => {
                report.succeeded += 1;
                if let Err(e) = queue.mark_done(job.id).await {
                    error!(job_id = %job.id, error = %e, "Failed to mark outbox job done");
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!(job_id = %job.id, job_type = %job.job_type, error = %e, "Outbox job failed");
                if let Err(mark_err) = queue.mark_error(job.id, &e.to_string()).await {
                    error!(job_id = %job.id, error = %mark_err, "Failed to mark outbox job error");
                }
            }
        }
    }

    Ok(report)
}

/// Poll the outbox every `interval` until `cancel` fires.
///
/// A full batch means more work is likely waiting, so the next drain
/// starts right away instead of sleeping.
pub async fn run<Q, E>(
    queue: Arc<Q>,
    executor: Arc<E>,
    interval: Duration,
    batch_size: i64,
    cancel: CancellationToken,
) where
    Q: OutboxQueue,
    E: JobExecutor,
{
    info!(
        interval_secs = interval.as_secs(),
        batch_size, "Outbox drainer started"
    );

    loop {
        let report = match drain_once(queue.as_ref(), executor.as_ref(), batch_size).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Outbox drain failed");
                DrainReport::default()
            }
        };

        if report.claimed > 0 {
            debug!(
                claimed = report.claimed,
                succeeded = report.succeeded,
                failed = report.failed,
                "Outbox batch drained"
            );
        }

        if cancel.is_cancelled() {
            break;
        }
        if report.claimed as i64 >= batch_size && batch_size > 0 {
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Outbox drainer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryQueue {
        jobs: Mutex<Vec<OutboxJob>>,
    }

    impl MemoryQueue {
        async fn push(&self, job_type: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.jobs.lock().await.push(OutboxJob {
                id,
                tenant_id: None,
                job_type: job_type.to_string(),
                payload: json!({}),
                status: JobStatus::Pending,
                attempts: 0,
                last_error: None,
                idempotency_key: id.to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                processed_at: None,
            });
            id
        }

        async fn statuses(&self) -> HashMap<Uuid, JobStatus> {
            self.jobs.lock().await.iter().map(|j| (j.id, j.status)).collect()
        }
    }

    impl OutboxQueue for MemoryQueue {
        async fn claim_batch(&self, limit: i64) -> Result<Vec<OutboxJob>, AppError> {
            let mut jobs = self.jobs.lock().await;
            let mut claimed = Vec::new();
            for job in jobs.iter_mut() {
                if claimed.len() as i64 >= limit {
                    break;
                }
                if job.status == JobStatus::Pending {
                    job.status = JobStatus::Processing;
                    job.attempts += 1;
                    claimed.push(job.clone());
                }
            }
            Ok(claimed)
        }

        async fn mark_done(&self, id: Uuid) -> Result<(), AppError> {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.status = JobStatus::Done;
            }
            Ok(())
        }

        async fn mark_error(&self, id: Uuid, message: &str) -> Result<(), AppError> {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.status = JobStatus::Error;
                job.last_error = Some(message.to_string());
            }
            Ok(())
        }
    }

    /// Fails any job whose type starts with "bad"
    struct PickyExecutor;

    impl JobExecutor for PickyExecutor {
        async fn execute(&self, job: &OutboxJob) -> Result<(), AppError> {
            if job.job_type.starts_with("bad") {
                Err(AppError::BadRequest("nope".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_drain_once_marks_each_job() {
        let queue = MemoryQueue::default();
        let good = queue.push("cache.invalidate").await;
        let bad = queue.push("bad.job").await;

        let report = drain_once(&queue, &PickyExecutor, 10).await.unwrap();
        assert_eq!(
            report,
            DrainReport {
                claimed: 2,
                succeeded: 1,
                failed: 1
            }
        );

        let statuses = queue.statuses().await;
        assert_eq!(statuses[&good], JobStatus::Done);
        assert_eq!(statuses[&bad], JobStatus::Error);
    }

    #[tokio::test]
    async fn test_drain_once_respects_batch_size() {
        let queue = MemoryQueue::default();
        for _ in 0..5 {
            queue.push("cache.invalidate").await;
        }

        let report = drain_once(&queue, &PickyExecutor, 2).await.unwrap();
        assert_eq!(report.claimed, 2);

        let pending = queue
            .statuses()
            .await
            .values()
            .filter(|s| **s == JobStatus::Pending)
            .count();
        assert_eq!(pending, 3);
    }

    #[tokio::test]
    async fn test_error_message_is_kept() {
        let queue = MemoryQueue::default();
        let id = queue.push("bad.job").await;
        drain_once(&queue, &PickyExecutor, 1).await.unwrap();

        let jobs = queue.jobs.lock().await;
        let job = jobs.iter().find(|j| j.id == id).unwrap();
        assert!(job.last_error.as_deref().unwrap().contains("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_backlog_and_stops_on_cancel() {
        let queue = Arc::new(MemoryQueue::default());
        for _ in 0..5 {
            queue.push("cache.invalidate").await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            queue.clone(),
            Arc::new(PickyExecutor),
            Duration::from_secs(30),
            2,
            cancel.clone(),
        ));

        // Full batches are drained back to back without waiting for the interval
        tokio::time::sleep(Duration::from_millis(10)).await;
        let done = queue
            .statuses()
            .await
            .values()
            .filter(|s| **s == JobStatus::Done)
            .count();
        assert_eq!(done, 5);

        cancel.cancel();
        handle.await.unwrap();
    }
}
