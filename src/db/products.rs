//! Product catalog storage

use super::filter::SqlFilter;
use super::{audit, outbox};
use crate::cache::CacheService;
use crate::error::AppError;
use crate::models::{
    normalize_sku, BulkFailure, BulkResult, CreateProductRequest, NewAudit, Page, Paginated,
    Product, ProductFilter, UpdateProductRequest, DEFAULT_CURRENCY,
};
use crate::outbox::Job;
use chrono::Utc;
use deadpool_postgres::{Pool, Transaction};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_postgres::Row;
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, sku, name, description, category, price_cents, currency, \
    is_active, created_at, updated_at";

fn from_row(row: &Row) -> Result<Product, AppError> {
    Ok(Product {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price_cents: row.try_get("price_cents")?,
        currency: row.try_get("currency")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn sku_conflict(e: AppError, sku: &str) -> AppError {
    match e {
        AppError::Conflict(_) => AppError::Conflict(format!("SKU '{}' already exists", sku)),
        other => other,
    }
}

#[derive(Clone)]
pub struct ProductService {
    pool: Pool,
    cache: Arc<CacheService>,
}

impl ProductService {
    pub fn new(pool: Pool, cache: Arc<CacheService>) -> Self {
        Self { pool, cache }
    }

    fn cache_prefix(tenant_id: Uuid) -> String {
        format!("{}:products:", tenant_id)
    }

    /// Cached per tenant and filter
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &ProductFilter,
    ) -> Result<Paginated<Product>, AppError> {
        let key = CacheService::tenant_key(tenant_id, "products", &filter.cache_fragment());
        self.cache
            .get_or_insert_with(&key, None, || self.list_uncached(tenant_id, filter))
            .await
    }

    async fn list_uncached(
        &self,
        tenant_id: Uuid,
        filter: &ProductFilter,
    ) -> Result<Paginated<Product>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("category", filter.category.clone())
            .eq_opt("is_active", filter.active)
            .search(&["name", "sku", "description"], filter.search.as_deref());

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(&format!("SELECT COUNT(*) FROM products{}", where_sql), &sql.params())
            .await?
            .try_get(0)?;
        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!("SELECT {} FROM products{} ORDER BY name ASC{}", COLUMNS, where_sql, limit),
                &sql.params(),
            )
            .await?;

        Ok(Paginated {
            items: rows.iter().map(from_row).collect::<Result<_, _>>()?,
            pagination: page.meta(total),
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Product, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM products WHERE id = $1 AND tenant_id = $2", COLUMNS),
                &[&id, &tenant_id],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        from_row(&row)
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        request: &CreateProductRequest,
    ) -> Result<Product, AppError> {
        let sku = normalize_sku(&request.sku);
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let now = Utc::now();
        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO products (id, tenant_id, sku, name, description, category, price_cents, currency, is_active, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                     RETURNING {}",
                    COLUMNS
                ),
                &[
                    &Uuid::new_v4(),
                    &tenant_id,
                    &sku,
                    &request.name.trim(),
                    &request.description,
                    &request.category,
                    &request.price_cents,
                    &request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
                    &request.is_active.unwrap_or(true),
                    &now,
                ],
            )
            .await
            .map_err(|e| sku_conflict(e.into(), &sku))?;
        let product = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "product", "product.created")
                .by(actor_id)
                .on(product.id)
                .with_details(json!({ "sku": product.sku, "priceCents": product.price_cents })),
        )
        .await?;
        self.finish(tx, tenant_id).await?;
        Ok(product)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        id: Uuid,
        request: &UpdateProductRequest,
    ) -> Result<Product, AppError> {
        let sku = request.sku.as_deref().map(normalize_sku);
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                &format!(
                    "UPDATE products SET
                        sku = COALESCE($3, sku),
                        name = COALESCE($4, name),
                        description = COALESCE($5, description),
                        category = COALESCE($6, category),
                        price_cents = COALESCE($7, price_cents),
                        currency = COALESCE($8, currency),
                        is_active = COALESCE($9, is_active),
                        updated_at = now()
                     WHERE id = $1 AND tenant_id = $2
                     RETURNING {}",
                    COLUMNS
                ),
                &[
                    &id,
                    &tenant_id,
                    &sku,
                    &request.name.as_deref().map(str::trim),
                    &request.description,
                    &request.category,
                    &request.price_cents,
                    &request.currency,
                    &request.is_active,
                ],
            )
            .await
            .map_err(|e| sku_conflict(e.into(), sku.as_deref().unwrap_or_default()))?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        let product = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "product", "product.updated")
                .by(actor_id)
                .on(id)
                .with_details(json!({ "priceCents": product.price_cents, "isActive": product.is_active })),
        )
        .await?;
        self.finish(tx, tenant_id).await?;
        Ok(product)
    }

    pub async fn delete(&self, tenant_id: Uuid, actor_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let deleted = tx
            .execute(
                "DELETE FROM products WHERE id = $1 AND tenant_id = $2",
                &[&id, &tenant_id],
            )
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Product {} not found", id)));
        }

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "product", "product.deleted").by(actor_id).on(id),
        )
        .await?;
        self.finish(tx, tenant_id).await
    }

    /// Delete many products in one transaction; unknown ids are reported, not fatal
    pub async fn bulk_delete(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        ids: &[Uuid],
    ) -> Result<BulkResult, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let rows = tx
            .query(
                "DELETE FROM products WHERE tenant_id = $1 AND id = ANY($2) RETURNING id",
                &[&tenant_id, &ids],
            )
            .await?;
        let deleted: HashSet<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<_, Uuid>("id"))
            .collect::<Result<_, _>>()?;

        let mut seen = HashSet::new();
        let mut result = BulkResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for id in ids.iter().copied().filter(|id| seen.insert(*id)) {
            if deleted.contains(&id) {
                result.succeeded.push(id);
            } else {
                result.failed.push(BulkFailure {
                    id,
                    reason: "Product not found".to_string(),
                });
            }
        }

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "product", "product.bulk_deleted")
                .by(actor_id)
                .with_details(json!({ "ids": result.succeeded })),
        )
        .await?;
        self.finish(tx, tenant_id).await?;
        Ok(result)
    }

    /// Queue a cache flush with the write, commit, then drop the cache right away
    async fn finish(&self, tx: Transaction<'_>, tenant_id: Uuid) -> Result<(), AppError> {
        let prefix = Self::cache_prefix(tenant_id);
        outbox::enqueue(
            &tx,
            Some(tenant_id),
            &Job::CacheInvalidate {
                prefix: prefix.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        // The queued job catches readers that refill the cache from a pre-commit snapshot
        self.cache.invalidate_prefix(&prefix).await;
        self.cache
            .invalidate_prefix(&format!("{}:dashboard:", tenant_id))
            .await;
        Ok(())
    }
}
