//! Dashboard route handlers

use crate::auth::Claims;
use crate::cache::CacheService;
use crate::dedup::dedup_key;
use crate::error::ApiResult;
use crate::models::{DashboardStats, SuccessResponse, DASHBOARD_ANALYTICS};
use crate::state::SharedState;
use axum::{
    extract::{Extension, State},
    http::Uri,
    Json,
};

/// GET /api/dashboard/stats
///
/// Served from the cache when fresh. Concurrent misses for the same tenant
/// share one database round trip.
pub async fn get_stats(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    uri: Uri,
) -> ApiResult<Json<SuccessResponse<DashboardStats>>> {
    state
        .entitlements
        .require(claims.tid, DASHBOARD_ANALYTICS)
        .await?;

    let tenant_id = claims.tid;
    let cache_key = CacheService::tenant_key(tenant_id, "dashboard", "stats");
    // Tenant goes into the key so two tenants never share a result
    let key = format!(
        "{} {}",
        tenant_id,
        dedup_key("GET", uri.path(), uri.query())
    );

    let stats = state
        .dashboard_dedup
        .run(key, || async {
            state
                .cache
                .get_or_insert_with(&cache_key, None, || {
                    state.proposals.dashboard_stats(tenant_id)
                })
                .await
        })
        .await?;

    Ok(Json(SuccessResponse::with_data("Dashboard statistics.", stats)))
}
