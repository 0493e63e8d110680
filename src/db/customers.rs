//! Customer storage

use super::filter::SqlFilter;
use super::{audit, text_column};
use crate::error::AppError;
use crate::models::{
    CreateCustomerRequest, Customer, CustomerFilter, CustomerStatus, NewAudit, Page, Paginated,
    UpdateCustomerRequest,
};
use chrono::Utc;
use deadpool_postgres::Pool;
use serde_json::json;
use tokio_postgres::Row;
use uuid::Uuid;

const COLUMNS: &str =
    "id, tenant_id, name, email, phone, industry, tier, status, created_at, updated_at";

fn from_row(row: &Row) -> Result<Customer, AppError> {
    Ok(Customer {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        industry: row.try_get("industry")?,
        tier: text_column(row, "tier")?,
        status: text_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct CustomerService {
    pool: Pool,
}

impl CustomerService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &CustomerFilter,
    ) -> Result<Paginated<Customer>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("status", filter.status.map(|s| s.as_str().to_string()))
            .eq_opt("tier", filter.tier.map(|t| t.as_str().to_string()))
            .search(&["name", "email", "industry"], filter.search.as_deref());

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(&format!("SELECT COUNT(*) FROM customers{}", where_sql), &sql.params())
            .await?
            .try_get(0)?;
        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!("SELECT {} FROM customers{} ORDER BY name ASC{}", COLUMNS, where_sql, limit),
                &sql.params(),
            )
            .await?;

        Ok(Paginated {
            items: rows.iter().map(from_row).collect::<Result<_, _>>()?,
            pagination: page.meta(total),
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Customer, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM customers WHERE id = $1 AND tenant_id = $2", COLUMNS),
                &[&id, &tenant_id],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))?;
        from_row(&row)
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        request: &CreateCustomerRequest,
    ) -> Result<Customer, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let now = Utc::now();
        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO customers (id, tenant_id, name, email, phone, industry, tier, status, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $8)
                     RETURNING {}",
                    COLUMNS
                ),
                &[
                    &Uuid::new_v4(),
                    &tenant_id,
                    &request.name.trim(),
                    &request.email.as_deref().map(str::trim),
                    &request.phone,
                    &request.industry,
                    &request.tier.as_str(),
                    &now,
                ],
            )
            .await?;
        let customer = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "customer", "customer.created")
                .by(actor_id)
                .on(customer.id)
                .with_details(json!({ "name": customer.name, "tier": customer.tier })),
        )
        .await?;

        tx.commit().await?;
        Ok(customer)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        id: Uuid,
        request: &UpdateCustomerRequest,
    ) -> Result<Customer, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                &format!(
                    "UPDATE customers SET
                        name = COALESCE($3, name),
                        email = COALESCE($4, email),
                        phone = COALESCE($5, phone),
                        industry = COALESCE($6, industry),
                        tier = COALESCE($7, tier),
                        status = COALESCE($8, status),
                        updated_at = now()
                     WHERE id = $1 AND tenant_id = $2
                     RETURNING {}",
                    COLUMNS
                ),
                &[
                    &id,
                    &tenant_id,
                    &request.name.as_deref().map(str::trim),
                    &request.email.as_deref().map(str::trim),
                    &request.phone,
                    &request.industry,
                    &request.tier.map(|t| t.as_str()),
                    &request.status.map(|s| s.as_str()),
                ],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))?;
        let customer = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "customer", "customer.updated")
                .by(actor_id)
                .on(id),
        )
        .await?;

        tx.commit().await?;
        Ok(customer)
    }

    /// Customers referenced by proposals are never hard-deleted
    pub async fn archive(&self, tenant_id: Uuid, actor_id: Uuid, id: Uuid) -> Result<Customer, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                &format!(
                    "UPDATE customers SET status = $3, updated_at = now()
                     WHERE id = $1 AND tenant_id = $2
                     RETURNING {}",
                    COLUMNS
                ),
                &[&id, &tenant_id, &CustomerStatus::Archived.as_str()],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))?;
        let customer = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "customer", "customer.archived").by(actor_id).on(id),
        )
        .await?;

        tx.commit().await?;
        Ok(customer)
    }
}
