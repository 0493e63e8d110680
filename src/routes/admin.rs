//! Admin route handlers: audit trail, outbox and cache

use crate::auth::{require_role, Claims, Role};
use crate::cache::CacheStats;
use crate::error::ApiResult;
use crate::models::{
    AuditFilter, AuditRecord, OutboxFilter, OutboxJob, PaginatedResponse, SuccessResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// GET /api/audit
pub async fn list_audit(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<PaginatedResponse<AuditRecord>>> {
    require_role(&claims, Role::Admin)?;

    let page = state.audit.list(claims.tid, &filter).await?;
    Ok(Json(PaginatedResponse::new("audit records", page)))
}

/// GET /api/admin/outbox
pub async fn list_outbox(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<OutboxFilter>,
) -> ApiResult<Json<PaginatedResponse<OutboxJob>>> {
    require_role(&claims, Role::Admin)?;

    let page = state.outbox.list(claims.tid, &filter).await?;
    Ok(Json(PaginatedResponse::new("jobs", page)))
}

/// POST /api/admin/outbox/{id}/retry
pub async fn retry_outbox_job(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<OutboxJob>>> {
    require_role(&claims, Role::Admin)?;

    let job = state.outbox.retry(claims.tid, id).await?;
    info!(job_id = %id, job_type = %job.job_type, "Outbox job requeued");
    Ok(Json(SuccessResponse::with_data("Job requeued.", job)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Dashboard requests currently collapsed or held for the window
    pub dedup_in_flight: usize,
}

/// GET /api/admin/cache
pub async fn cache_stats(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<CacheReport>>> {
    require_role(&claims, Role::Admin)?;

    let report = CacheReport {
        cache: state.cache.stats().await,
        dedup_in_flight: state.dashboard_dedup.in_flight().await,
    };
    Ok(Json(SuccessResponse::with_data("Cache statistics.", report)))
}

/// DELETE /api/admin/cache
///
/// Drops every cached entry of the caller's tenant.
pub async fn flush_cache(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<serde_json::Value>>> {
    require_role(&claims, Role::Admin)?;

    let removed = state
        .cache
        .invalidate_prefix(&format!("{}:", claims.tid))
        .await;
    info!(tenant_id = %claims.tid, removed, "Tenant cache flushed");
    Ok(Json(SuccessResponse::with_data(
        format!("{} cache entries removed.", removed),
        serde_json::json!({ "removed": removed }),
    )))
}
