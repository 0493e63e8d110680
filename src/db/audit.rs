//! Audit trail storage

use super::filter::SqlFilter;
use crate::error::AppError;
use crate::models::{AuditFilter, AuditRecord, NewAudit, Page, Paginated};
use chrono::Utc;
use deadpool_postgres::{Pool, Transaction};
use tokio_postgres::Row;
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, actor_id, entity_type, entity_id, action, details, created_at";

const INSERT: &str = "INSERT INTO audit_log
    (id, tenant_id, actor_id, entity_type, entity_id, action, details, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

fn from_row(row: &Row) -> Result<AuditRecord, AppError> {
    Ok(AuditRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        actor_id: row.try_get("actor_id")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        action: row.try_get("action")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Write an audit record as part of a larger transaction
pub async fn record(tx: &Transaction<'_>, audit: NewAudit) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    tx.execute(
        INSERT,
        &[
            &id,
            &audit.tenant_id,
            &audit.actor_id,
            &audit.entity_type,
            &audit.entity_id,
            &audit.action,
            &audit.details,
            &Utc::now(),
        ],
    )
    .await?;
    Ok(id)
}

#[derive(Clone)]
pub struct AuditService {
    pool: Pool,
}

impl AuditService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Write a record on its own connection
    pub async fn record_standalone(&self, audit: NewAudit) -> Result<Uuid, AppError> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        client
            .execute(
                INSERT,
                &[
                    &id,
                    &audit.tenant_id,
                    &audit.actor_id,
                    &audit.entity_type,
                    &audit.entity_id,
                    &audit.action,
                    &audit.details,
                    &Utc::now(),
                ],
            )
            .await?;
        Ok(id)
    }

    /// Newest first
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &AuditFilter,
    ) -> Result<Paginated<AuditRecord>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("entity_type", filter.entity_type.clone())
            .eq_opt("entity_id", filter.entity_id)
            .eq_opt("actor_id", filter.actor_id);

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM audit_log{}", where_sql),
                &sql.params(),
            )
            .await?
            .try_get(0)?;

        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM audit_log{} ORDER BY created_at DESC{}",
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
}
