//! Per-tenant entitlement storage

use super::audit;
use crate::cache::CacheService;
use crate::error::AppError;
use crate::models::{Entitlement, NewAudit, UpsertEntitlementRequest, DEFAULT_ENTITLEMENTS};
use deadpool_postgres::{Pool, Transaction};
use serde_json::json;
use std::sync::Arc;
use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

const COLUMNS: &str = "tenant_id, key, enabled, value, updated_at";

fn from_row(row: &Row) -> Result<Entitlement, AppError> {
    Ok(Entitlement {
        tenant_id: row.try_get("tenant_id")?,
        key: row.try_get("key")?,
        enabled: row.try_get("enabled")?,
        value: row.try_get("value")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert the default entitlement set for a new tenant
pub async fn seed_defaults(tx: &Transaction<'_>, tenant_id: Uuid) -> Result<(), AppError> {
    let stmt = tx
        .prepare(
            "INSERT INTO entitlements (tenant_id, key, enabled) VALUES ($1, $2, $3)
             ON CONFLICT (tenant_id, key) DO NOTHING",
        )
        .await?;
    for (key, enabled) in DEFAULT_ENTITLEMENTS {
        tx.execute(&stmt, &[&tenant_id, key, enabled]).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct EntitlementService {
    pool: Pool,
    cache: Arc<CacheService>,
}

impl EntitlementService {
    pub fn new(pool: Pool, cache: Arc<CacheService>) -> Self {
        Self { pool, cache }
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<Entitlement>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!("SELECT {} FROM entitlements WHERE tenant_id = $1 ORDER BY key", COLUMNS),
                &[&tenant_id],
            )
            .await?;
        rows.iter().map(from_row).collect()
    }

    pub async fn get(&self, tenant_id: Uuid, key: &str) -> Result<Entitlement, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM entitlements WHERE tenant_id = $1 AND key = $2", COLUMNS),
                &[&tenant_id, &key],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Entitlement '{}' not found", key)))?;
        from_row(&row)
    }

    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        key: &str,
        request: &UpsertEntitlementRequest,
    ) -> Result<Entitlement, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO entitlements (tenant_id, key, enabled, value, updated_at)
                     VALUES ($1, $2, $3, $4, now())
                     ON CONFLICT (tenant_id, key)
                     DO UPDATE SET enabled = EXCLUDED.enabled, value = EXCLUDED.value, updated_at = now()
                     RETURNING {}",
                    COLUMNS
                ),
                &[&tenant_id, &key, &request.enabled, &request.value],
            )
            .await?;
        let entitlement = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "entitlement", "entitlement.updated")
                .by(actor_id)
                .with_details(json!({ "key": key, "enabled": request.enabled, "value": request.value })),
        )
        .await?;
        tx.commit().await?;

        self.cache
            .delete(&CacheService::tenant_key(tenant_id, "entitlements", key))
            .await;
        info!(%tenant_id, key, enabled = request.enabled, "Entitlement updated");
        Ok(entitlement)
    }

    /// Whether a feature is on for the tenant; a missing row means off
    pub async fn is_enabled(&self, tenant_id: Uuid, key: &str) -> Result<bool, AppError> {
        let cache_key = CacheService::tenant_key(tenant_id, "entitlements", key);
        self.cache
            .get_or_insert_with(&cache_key, None, || async {
                let client = self.pool.get().await?;
                let row = client
                    .query_opt(
                        "SELECT enabled FROM entitlements WHERE tenant_id = $1 AND key = $2",
                        &[&tenant_id, &key],
                    )
                    .await?;
                let enabled = match row {
                    Some(row) => row.try_get::<_, bool>("enabled")?,
                    None => false,
                };
                Ok::<bool, AppError>(enabled)
            })
            .await
    }

    /// Fail with 403 unless the feature is enabled
    pub async fn require(&self, tenant_id: Uuid, key: &str) -> Result<(), AppError> {
        if self.is_enabled(tenant_id, key).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Feature '{}' is not enabled for this organisation",
                key
            )))
        }
    }
}
