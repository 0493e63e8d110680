//! Outbox job storage

use super::filter::SqlFilter;
use super::text_column;
use crate::error::AppError;
use crate::models::{JobStatus, OutboxFilter, OutboxJob, Page, Paginated};
use crate::outbox::{idempotency_key, Job, OutboxQueue};
use deadpool_postgres::{Pool, Transaction};
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, job_type, payload, status, attempts, last_error, \
    idempotency_key, created_at, updated_at, processed_at";

/// Longest `last_error` kept per job
const MAX_ERROR_LEN: usize = 2000;

/// A job left in `processing` this long is assumed orphaned by a dead drainer
const STALE_PROCESSING: &str = "5 minutes";

fn from_row(row: &Row) -> Result<OutboxJob, AppError> {
    Ok(OutboxJob {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        status: text_column(row, "status")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// Record a job in the writer's transaction.
///
/// Returns `false` when an identical job is already pending.
pub async fn enqueue(tx: &Transaction<'_>, tenant_id: Option<Uuid>, job: &Job) -> Result<bool, AppError> {
    let (job_type, payload) = job.into_parts()?;
    let key = idempotency_key(&job_type, tenant_id, &payload);
    let inserted = tx
        .execute(
            "INSERT INTO outbox_jobs (id, tenant_id, job_type, payload, status, idempotency_key)
             VALUES ($1, $2, $3, $4, 'pending', $5)
             ON CONFLICT (idempotency_key) WHERE status = 'pending' DO NOTHING",
            &[&Uuid::new_v4(), &tenant_id, &job_type, &payload, &key],
        )
        .await?;

    if inserted == 0 {
        debug!(job_type, key, "Duplicate outbox job ignored");
    }
    Ok(inserted > 0)
}

#[derive(Clone)]
pub struct OutboxService {
    pool: Pool,
}

impl OutboxService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Jobs belonging to one tenant, newest first
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &OutboxFilter,
    ) -> Result<Paginated<OutboxJob>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("status", filter.status.map(|s| s.as_str().to_string()));

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM outbox_jobs{}", where_sql),
                &sql.params(),
            )
            .await?
            .try_get(0)?;
        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM outbox_jobs{} ORDER BY created_at DESC{}",
                    COLUMNS, where_sql, limit
                ),
                &sql.params(),
            )
            .await?;

        Ok(Paginated {
            items: rows.iter().map(from_row).collect::<Result<_, _>>()?,
            pagination: page.meta(total),
        })
    }

    /// Requeue an errored job belonging to `tenant_id`
    pub async fn retry(&self, tenant_id: Uuid, id: Uuid) -> Result<OutboxJob, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE outbox_jobs SET status = 'pending', updated_at = now()
                     WHERE id = $1 AND tenant_id = $2 AND status = 'error'
                     RETURNING {}",
                    COLUMNS
                ),
                &[&id, &tenant_id],
            )
            .await?;

        match row {
            Some(row) => from_row(&row),
            None => {
                let exists = client
                    .query_opt(
                        "SELECT status FROM outbox_jobs WHERE id = $1 AND tenant_id = $2",
                        &[&id, &tenant_id],
                    )
                    .await?;
                match exists {
                    Some(row) => {
                        let status: JobStatus = text_column(&row, "status")?;
                        Err(AppError::Conflict(format!(
                            "Only errored jobs can be retried (job is {})",
                            status
                        )))
                    }
                    None => Err(AppError::NotFound(format!("Outbox job {} not found", id))),
                }
            }
        }
    }
}

impl OutboxQueue for OutboxService {
    async fn claim_batch(&self, limit: i64) -> Result<Vec<OutboxJob>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "UPDATE outbox_jobs SET status = 'processing', updated_at = now()
                     WHERE id IN (
                         SELECT id FROM outbox_jobs
                         WHERE status = 'pending'
                            OR (status = 'processing' AND updated_at < now() - interval '{}')
                         ORDER BY created_at ASC
                         LIMIT $1
                         FOR UPDATE SKIP LOCKED
                     )
                     RETURNING {}",
                    STALE_PROCESSING, COLUMNS
                ),
                &[&limit],
            )
            .await?;

        // RETURNING does not preserve the subquery order
        let mut jobs = rows.iter().map(from_row).collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn mark_done(&self, id: Uuid) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE outbox_jobs
                 SET status = 'done', attempts = attempts + 1, last_error = NULL,
                     processed_at = now(), updated_at = now()
                 WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(())
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<(), AppError> {
        let message: String = message.chars().take(MAX_ERROR_LEN).collect();
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE outbox_jobs
                 SET status = 'error', attempts = attempts + 1, last_error = $2,
                     updated_at = now()
                 WHERE id = $1",
                &[&id, &message],
            )
            .await?;
        Ok(())
    }
}
