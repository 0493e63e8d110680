//! Entitlement route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::{ApiResult, AppError};
use crate::models::{is_valid_key, Entitlement, SuccessResponse, UpsertEntitlementRequest};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    Json,
};

fn checked_key(key: &str) -> Result<&str, AppError> {
    if is_valid_key(key) {
        Ok(key)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid entitlement key '{}': use lower-case dotted names like 'proposals.bulk'",
            key
        )))
    }
}

/// GET /api/entitlements
pub async fn list_entitlements(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<Vec<Entitlement>>>> {
    let entitlements = state.entitlements.list(claims.tid).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} entitlements found.", entitlements.len()),
        entitlements,
    )))
}

/// GET /api/entitlements/{key}
pub async fn get_entitlement(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(key): Path<String>,
) -> ApiResult<Json<SuccessResponse<Entitlement>>> {
    let entitlement = state.entitlements.get(claims.tid, checked_key(&key)?).await?;
    Ok(Json(SuccessResponse::with_data("Entitlement found.", entitlement)))
}

/// PUT /api/entitlements/{key}
pub async fn put_entitlement(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(key): Path<String>,
    Json(req): Json<UpsertEntitlementRequest>,
) -> ApiResult<Json<SuccessResponse<Entitlement>>> {
    require_role(&claims, Role::Admin)?;

    let entitlement = state
        .entitlements
        .upsert(claims.tid, claims.sub, checked_key(&key)?, &req)
        .await?;
    Ok(Json(SuccessResponse::with_data("Entitlement saved.", entitlement)))
}
