//! Proposal storage and workflow
//!
//! Every content change or status transition runs in one transaction that
//! bumps the version, writes a history snapshot and an audit record, and
//! queues an outbox job.

use super::filter::SqlFilter;
use super::{audit, json_column, outbox, text_column};
use crate::auth::Role;
use crate::cache::CacheService;
use crate::error::AppError;
use crate::models::{
    total_cents, BulkFailure, BulkResult, CreateProposalRequest, CustomerStatus, DashboardStats,
    LineItem, LineItemInput, NewAudit, Page, Paginated, Product, Proposal, ProposalFilter,
    ProposalStatus, ProposalVersion, UpdateProposalRequest, DEFAULT_CURRENCY,
};
use crate::outbox::Job;
use chrono::Utc;
use deadpool_postgres::{Pool, Transaction};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, customer_id, title, description, status, priority, due_date, \
    line_items, total_cents, currency, version, created_by, created_at, updated_at";

fn from_row(row: &Row) -> Result<Proposal, AppError> {
    Ok(Proposal {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        customer_id: row.try_get("customer_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: text_column(row, "status")?,
        priority: text_column(row, "priority")?,
        due_date: row.try_get("due_date")?,
        line_items: json_column(row, "line_items")?,
        total_cents: row.try_get("total_cents")?,
        currency: row.try_get("currency")?,
        version: row.try_get("version")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_from_row(row: &Row) -> Result<ProposalVersion, AppError> {
    Ok(ProposalVersion {
        id: row.try_get("id")?,
        proposal_id: row.try_get("proposal_id")?,
        version: row.try_get("version")?,
        snapshot: row.try_get("snapshot")?,
        change_summary: row.try_get("change_summary")?,
        changed_by: row.try_get("changed_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Turn submitted lines into priced lines.
///
/// Lines pointing at a product inherit its name and price unless given.
/// A product priced in another currency must carry an explicit price.
pub(crate) fn price_lines(
    inputs: &[LineItemInput],
    products: &HashMap<Uuid, Product>,
    currency: &str,
) -> Result<Vec<LineItem>, AppError> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let position = index + 1;
            let product = match input.product_id {
                Some(id) => Some(products.get(&id).ok_or_else(|| {
                    AppError::BadRequest(format!("Line {}: product {} does not exist", position, id))
                })?),
                None => None,
            };

            let name = match (&input.name, product) {
                (Some(name), _) => name.trim().to_string(),
                (None, Some(product)) => product.name.clone(),
                (None, None) => {
                    return Err(AppError::Validation(format!(
                        "line_items[{}].name: required without a product",
                        position
                    )))
                }
            };

            let unit_price_cents = match (input.unit_price_cents, product) {
                (Some(price), _) => price,
                (None, Some(product)) if product.currency == currency => product.price_cents,
                (None, Some(product)) => {
                    return Err(AppError::BadRequest(format!(
                        "Line {}: product is priced in {}, proposal is in {}; give a unit price",
                        position, product.currency, currency
                    )))
                }
                (None, None) => {
                    return Err(AppError::Validation(format!(
                        "line_items[{}].unit_price_cents: required without a product",
                        position
                    )))
                }
            };

            Ok(LineItem {
                product_id: input.product_id,
                name,
                quantity: input.quantity,
                unit_price_cents,
                discount_percent: input.discount_percent,
            })
        })
        .collect()
}

async fn load_products(
    tx: &Transaction<'_>,
    tenant_id: Uuid,
    inputs: &[LineItemInput],
) -> Result<HashMap<Uuid, Product>, AppError> {
    let ids: Vec<Uuid> = inputs.iter().filter_map(|i| i.product_id).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = tx
        .query(
            "SELECT id, tenant_id, sku, name, description, category, price_cents, currency,
                    is_active, created_at, updated_at
             FROM products WHERE tenant_id = $1 AND id = ANY($2) AND is_active",
            &[&tenant_id, &ids],
        )
        .await?;

    let mut products = HashMap::with_capacity(rows.len());
    for row in &rows {
        let product = Product {
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
        };
        products.insert(product.id, product);
    }
    Ok(products)
}

async fn ensure_customer(tx: &Transaction<'_>, tenant_id: Uuid, customer_id: Uuid) -> Result<(), AppError> {
    let row = tx
        .query_opt(
            "SELECT status FROM customers WHERE id = $1 AND tenant_id = $2",
            &[&customer_id, &tenant_id],
        )
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("Customer {} does not exist", customer_id)))?;
    let status: CustomerStatus = text_column(&row, "status")?;
    if status == CustomerStatus::Archived {
        return Err(AppError::BadRequest(format!("Customer {} is archived", customer_id)));
    }
    Ok(())
}

async fn lock(tx: &Transaction<'_>, tenant_id: Uuid, id: Uuid) -> Result<Proposal, AppError> {
    let row = tx
        .query_opt(
            &format!(
                "SELECT {} FROM proposals WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
                COLUMNS
            ),
            &[&id, &tenant_id],
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))?;
    from_row(&row)
}

async fn write_version(
    tx: &Transaction<'_>,
    proposal: &Proposal,
    change_summary: &str,
    changed_by: Uuid,
) -> Result<(), AppError> {
    let snapshot = serde_json::to_value(proposal)
        .map_err(|e| AppError::Internal(format!("Failed to snapshot proposal: {}", e)))?;
    tx.execute(
        "INSERT INTO proposal_versions (id, proposal_id, tenant_id, version, snapshot, change_summary, changed_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
        &[
            &Uuid::new_v4(),
            &proposal.id,
            &proposal.tenant_id,
            &proposal.version,
            &snapshot,
            &change_summary,
            &changed_by,
        ],
    )
    .await?;
    Ok(())
}

/// Who is acting on a proposal
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Clone)]
pub struct ProposalService {
    pool: Pool,
    cache: Arc<CacheService>,
}

impl ProposalService {
    pub fn new(pool: Pool, cache: Arc<CacheService>) -> Self {
        Self { pool, cache }
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &ProposalFilter,
    ) -> Result<Paginated<Proposal>, AppError> {
        let key = CacheService::tenant_key(tenant_id, "proposals", &filter.cache_fragment());
        self.cache
            .get_or_insert_with(&key, None, || self.list_uncached(tenant_id, filter))
            .await
    }

    async fn list_uncached(
        &self,
        tenant_id: Uuid,
        filter: &ProposalFilter,
    ) -> Result<Paginated<Proposal>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("status", filter.status.map(|s| s.as_str().to_string()))
            .eq_opt("customer_id", filter.customer_id)
            .eq_opt("priority", filter.priority.map(|p| p.as_str().to_string()))
            .search(&["title", "description"], filter.search.as_deref());

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(&format!("SELECT COUNT(*) FROM proposals{}", where_sql), &sql.params())
            .await?
            .try_get(0)?;
        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM proposals{} ORDER BY updated_at DESC{}",
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

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Proposal, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM proposals WHERE id = $1 AND tenant_id = $2", COLUMNS),
                &[&id, &tenant_id],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))?;
        from_row(&row)
    }

    pub async fn create(&self, actor: Actor, request: &CreateProposalRequest) -> Result<Proposal, AppError> {
        let currency = request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY).to_string();
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        ensure_customer(&tx, actor.tenant_id, request.customer_id).await?;
        let products = load_products(&tx, actor.tenant_id, &request.line_items).await?;
        let line_items = price_lines(&request.line_items, &products, &currency)?;

        let now = Utc::now();
        let proposal = Proposal {
            id: Uuid::new_v4(),
            tenant_id: actor.tenant_id,
            customer_id: request.customer_id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            status: ProposalStatus::Draft,
            priority: request.priority,
            due_date: request.due_date,
            total_cents: total_cents(&line_items)?,
            line_items,
            currency,
            version: 1,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };

        tx.execute(
            "INSERT INTO proposals (id, tenant_id, customer_id, title, description, status, priority,
                                    due_date, line_items, total_cents, currency, version, created_by,
                                    created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)",
            &[
                &proposal.id,
                &proposal.tenant_id,
                &proposal.customer_id,
                &proposal.title,
                &proposal.description,
                &proposal.status.as_str(),
                &proposal.priority.as_str(),
                &proposal.due_date,
                &serde_json::to_value(&proposal.line_items)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
                &proposal.total_cents,
                &proposal.currency,
                &proposal.version,
                &proposal.created_by,
                &now,
            ],
        )
        .await?;

        write_version(&tx, &proposal, "Created", actor.user_id).await?;
        audit::record(
            &tx,
            NewAudit::new(actor.tenant_id, "proposal", "proposal.created")
                .by(actor.user_id)
                .on(proposal.id)
                .with_details(json!({ "title": proposal.title, "totalCents": proposal.total_cents })),
        )
        .await?;
        outbox::enqueue(
            &tx,
            Some(actor.tenant_id),
            &Job::ProposalUpdated {
                proposal_id: proposal.id,
                version: proposal.version,
            },
        )
        .await?;

        tx.commit().await?;
        self.invalidate(actor.tenant_id).await;
        info!(proposal_id = %proposal.id, tenant_id = %actor.tenant_id, "Proposal created");
        Ok(proposal)
    }

    /// Change content; only draft and rejected proposals are editable
    pub async fn update(
        &self,
        actor: Actor,
        id: Uuid,
        request: &UpdateProposalRequest,
    ) -> Result<Proposal, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let mut proposal = lock(&tx, actor.tenant_id, id).await?;
        if !proposal.status.is_editable() {
            return Err(AppError::Conflict(format!(
                "Proposal is {} and can no longer be edited",
                proposal.status
            )));
        }

        let mut changed = Vec::new();
        if let Some(customer_id) = request.customer_id {
            if customer_id != proposal.customer_id {
                ensure_customer(&tx, actor.tenant_id, customer_id).await?;
                proposal.customer_id = customer_id;
                changed.push("customer");
            }
        }
        if let Some(title) = &request.title {
            proposal.title = title.trim().to_string();
            changed.push("title");
        }
        if let Some(description) = &request.description {
            proposal.description = Some(description.clone());
            changed.push("description");
        }
        if let Some(priority) = request.priority {
            proposal.priority = priority;
            changed.push("priority");
        }
        if let Some(due_date) = request.due_date {
            proposal.due_date = Some(due_date);
            changed.push("due date");
        }
        if let Some(inputs) = &request.line_items {
            let products = load_products(&tx, actor.tenant_id, inputs).await?;
            proposal.line_items = price_lines(inputs, &products, &proposal.currency)?;
            proposal.total_cents = total_cents(&proposal.line_items)?;
            changed.push("line items");
        }

        if changed.is_empty() {
            return Err(AppError::BadRequest("No changes supplied".to_string()));
        }

        proposal.version += 1;
        proposal.updated_at = Utc::now();
        tx.execute(
            "UPDATE proposals SET customer_id = $3, title = $4, description = $5, priority = $6,
                    due_date = $7, line_items = $8, total_cents = $9, version = $10, updated_at = $11
             WHERE id = $1 AND tenant_id = $2",
            &[
                &proposal.id,
                &proposal.tenant_id,
                &proposal.customer_id,
                &proposal.title,
                &proposal.description,
                &proposal.priority.as_str(),
                &proposal.due_date,
                &serde_json::to_value(&proposal.line_items)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
                &proposal.total_cents,
                &proposal.version,
                &proposal.updated_at,
            ],
        )
        .await?;

        let summary = request
            .change_summary
            .clone()
            .unwrap_or_else(|| format!("Updated {}", changed.join(", ")));
        write_version(&tx, &proposal, &summary, actor.user_id).await?;
        audit::record(
            &tx,
            NewAudit::new(actor.tenant_id, "proposal", "proposal.updated")
                .by(actor.user_id)
                .on(proposal.id)
                .with_details(json!({ "fields": changed, "version": proposal.version })),
        )
        .await?;
        outbox::enqueue(
            &tx,
            Some(actor.tenant_id),
            &Job::ProposalUpdated {
                proposal_id: proposal.id,
                version: proposal.version,
            },
        )
        .await?;

        tx.commit().await?;
        self.invalidate(actor.tenant_id).await;
        Ok(proposal)
    }

    /// Only drafts can be deleted; anything further along is archived instead
    pub async fn delete(&self, actor: Actor, id: Uuid) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let proposal = lock(&tx, actor.tenant_id, id).await?;
        if proposal.status != ProposalStatus::Draft {
            return Err(AppError::Conflict(format!(
                "Only draft proposals can be deleted (this one is {}); archive it instead",
                proposal.status
            )));
        }

        tx.execute(
            "DELETE FROM proposals WHERE id = $1 AND tenant_id = $2",
            &[&id, &actor.tenant_id],
        )
        .await?;
        audit::record(
            &tx,
            NewAudit::new(actor.tenant_id, "proposal", "proposal.deleted")
                .by(actor.user_id)
                .on(id)
                .with_details(json!({ "title": proposal.title })),
        )
        .await?;

        tx.commit().await?;
        self.invalidate(actor.tenant_id).await;
        Ok(())
    }

    /// Move a proposal along the workflow
    pub async fn transition(
        &self,
        actor: Actor,
        id: Uuid,
        to: ProposalStatus,
        comment: Option<&str>,
    ) -> Result<Proposal, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let proposal = self.transition_in(&tx, actor, id, to, comment).await?;
        tx.commit().await?;
        self.invalidate(actor.tenant_id).await;
        Ok(proposal)
    }

    async fn transition_in(
        &self,
        tx: &Transaction<'_>,
        actor: Actor,
        id: Uuid,
        to: ProposalStatus,
        comment: Option<&str>,
    ) -> Result<Proposal, AppError> {
        let mut proposal = lock(tx, actor.tenant_id, id).await?;
        let from = proposal.status;

        if !from.can_transition(to) {
            return Err(AppError::Conflict(format!(
                "Cannot move a proposal from {} to {}",
                from, to
            )));
        }
        if to.requires_approver() && !actor.role.can_approve() {
            return Err(AppError::Forbidden(format!(
                "Only managers and admins can move a proposal to {}",
                to
            )));
        }
        if to == ProposalStatus::InReview && proposal.line_items.is_empty() {
            return Err(AppError::BadRequest(
                "Add at least one line item before submitting for review".to_string(),
            ));
        }

        proposal.status = to;
        proposal.version += 1;
        proposal.updated_at = Utc::now();
        tx.execute(
            "UPDATE proposals SET status = $3, version = $4, updated_at = $5
             WHERE id = $1 AND tenant_id = $2",
            &[
                &proposal.id,
                &proposal.tenant_id,
                &to.as_str(),
                &proposal.version,
                &proposal.updated_at,
            ],
        )
        .await?;

        let summary = match comment {
            Some(c) if !c.trim().is_empty() => format!("Status {} -> {}: {}", from, to, c.trim()),
            _ => format!("Status {} -> {}", from, to),
        };
        write_version(tx, &proposal, &summary, actor.user_id).await?;
        audit::record(
            tx,
            NewAudit::new(actor.tenant_id, "proposal", "proposal.status_changed")
                .by(actor.user_id)
                .on(proposal.id)
                .with_details(json!({ "from": from, "to": to, "comment": comment })),
        )
        .await?;
        outbox::enqueue(
            tx,
            Some(actor.tenant_id),
            &Job::ProposalStatusChanged {
                proposal_id: proposal.id,
                from,
                to,
                version: proposal.version,
                actor_id: actor.user_id,
                comment: comment.map(str::to_string),
            },
        )
        .await?;

        debug!(proposal_id = %proposal.id, %from, %to, version = proposal.version, "Proposal transitioned");
        Ok(proposal)
    }

    /// Transition many proposals; each id succeeds or fails on its own
    pub async fn bulk_transition(
        &self,
        actor: Actor,
        ids: &[Uuid],
        to: ProposalStatus,
    ) -> Result<BulkResult, AppError> {
        let mut result = BulkResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        let outcome = run_bulk(ids, &mut result, |id| self.transition_one(actor, id, to)).await;

        // Ids committed before a database failure still changed
        if !result.succeeded.is_empty() {
            self.invalidate(actor.tenant_id).await;
        }
        outcome?;

        info!(
            tenant_id = %actor.tenant_id,
            %to,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Bulk status change finished"
        );
        Ok(result)
    }

    async fn transition_one(&self, actor: Actor, id: Uuid, to: ProposalStatus) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        match self.transition_in(&tx, actor, id, to, None).await {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Version history, newest first
    pub async fn versions(&self, tenant_id: Uuid, id: Uuid) -> Result<Vec<ProposalVersion>, AppError> {
        // 404 for proposals outside the tenant
        self.get(tenant_id, id).await?;

        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, proposal_id, version, snapshot, change_summary, changed_by, created_at
                 FROM proposal_versions
                 WHERE proposal_id = $1 AND tenant_id = $2
                 ORDER BY version DESC",
                &[&id, &tenant_id],
            )
            .await?;
        rows.iter().map(version_from_row).collect()
    }

    /// Aggregates straight from the database
    pub async fn dashboard_stats(&self, tenant_id: Uuid) -> Result<DashboardStats, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT status, COUNT(*) AS count, COALESCE(SUM(total_cents), 0)::BIGINT AS value
                 FROM proposals WHERE tenant_id = $1 GROUP BY status",
                &[&tenant_id],
            )
            .await?;

        let mut stats = DashboardStats::default();
        for row in &rows {
            let status: ProposalStatus = text_column(row, "status")?;
            let count: i64 = row.try_get("count")?;
            let value: i64 = row.try_get("value")?;

            stats.total_proposals += count;
            stats.by_status.insert(status.as_str().to_string(), count);
            match status {
                ProposalStatus::Accepted => stats.won_cents += value,
                s if !s.is_closed() => stats.open_pipeline_cents += value,
                _ => {}
            }
        }
        stats.compute_win_rate();

        let counts = client
            .query_one(
                "SELECT
                    (SELECT COUNT(*) FROM customers WHERE tenant_id = $1 AND status <> 'archived') AS customers,
                    (SELECT COUNT(*) FROM products WHERE tenant_id = $1 AND is_active) AS active_products",
                &[&tenant_id],
            )
            .await?;
        stats.customers = counts.try_get("customers")?;
        stats.active_products = counts.try_get("active_products")?;

        Ok(stats)
    }

    async fn invalidate(&self, tenant_id: Uuid) {
        self.cache
            .invalidate_prefix(&format!("{}:proposals:", tenant_id))
            .await;
        self.cache
            .invalidate_prefix(&format!("{}:dashboard:", tenant_id))
            .await;
    }
}

/// Run `step` once per distinct id. Errors about the id itself are recorded
/// as failures; database and pool errors stop the batch.
async fn run_bulk<F, Fut>(ids: &[Uuid], result: &mut BulkResult, mut step: F) -> Result<(), AppError>
where
    F: FnMut(Uuid) -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    let mut seen = HashSet::new();
    for id in ids.iter().copied().filter(|id| seen.insert(*id)) {
        match step(id).await {
            Ok(()) => result.succeeded.push(id),
            Err(e @ (AppError::Database(_) | AppError::Pool(_))) => return Err(e),
            Err(e) => result.failed.push(BulkFailure {
                id,
                reason: e.to_string(),
            }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn product(price_cents: i64, currency: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            sku: "CLOUD-STD".into(),
            name: "Cloud Standard".into(),
            description: None,
            category: None,
            price_cents,
            currency: currency.into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn input(product_id: Option<Uuid>, name: Option<&str>, price: Option<i64>) -> LineItemInput {
        LineItemInput {
            product_id,
            name: name.map(str::to_string),
            quantity: 2,
            unit_price_cents: price,
            discount_percent: 10,
        }
    }

    #[test]
    fn test_product_lines_inherit_name_and_price() {
        let p = product(5_000, "USD");
        let products = HashMap::from([(p.id, p.clone())]);

        let lines = price_lines(&[input(Some(p.id), None, None)], &products, "USD").unwrap();
        assert_eq!(lines[0].name, "Cloud Standard");
        assert_eq!(lines[0].unit_price_cents, 5_000);
        assert_eq!(total_cents(&lines).unwrap(), 9_000);
    }

    #[test]
    fn test_explicit_values_override_product() {
        let p = product(5_000, "USD");
        let products = HashMap::from([(p.id, p.clone())]);

        let lines =
            price_lines(&[input(Some(p.id), Some(" Special "), Some(4_000))], &products, "USD").unwrap();
        assert_eq!(lines[0].name, "Special");
        assert_eq!(lines[0].unit_price_cents, 4_000);
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let result = price_lines(&[input(Some(Uuid::new_v4()), None, None)], &HashMap::new(), "USD");
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_free_lines_need_name_and_price() {
        let products = HashMap::new();
        assert!(matches!(
            price_lines(&[input(None, None, Some(100))], &products, "USD"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            price_lines(&[input(None, Some("Setup"), None)], &products, "USD"),
            Err(AppError::Validation(_))
        ));
        assert!(price_lines(&[input(None, Some("Setup"), Some(100))], &products, "USD").is_ok());
    }

    #[test]
    fn test_currency_mismatch_needs_explicit_price() {
        let p = product(5_000, "EUR");
        let products = HashMap::from([(p.id, p.clone())]);

        assert!(price_lines(&[input(Some(p.id), None, None)], &products, "USD").is_err());
        assert!(price_lines(&[input(Some(p.id), None, Some(5_500))], &products, "USD").is_ok());
    }

    #[tokio::test]
    async fn test_bulk_records_per_id_failures() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut result = BulkResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        let outcome = run_bulk(&[a, b, a], &mut result, |id| async move {
            if id == a {
                Ok(())
            } else {
                Err(AppError::Conflict("Cannot move draft to accepted".into()))
            }
        })
        .await;

        assert!(outcome.is_ok());
        assert_eq!(result.succeeded, vec![a]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, b);
    }

    #[tokio::test]
    async fn test_bulk_keeps_committed_ids_when_the_pool_fails() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut result = BulkResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        let outcome = run_bulk(&[a, b, c], &mut result, |id| async move {
            if id == a {
                Ok(())
            } else {
                Err(AppError::Pool(deadpool_postgres::PoolError::Closed))
            }
        })
        .await;

        assert!(matches!(outcome, Err(AppError::Pool(_))));
        assert_eq!(result.succeeded, vec![a]);
        assert!(result.failed.is_empty());
    }
}
