//! Customer route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::ApiResult;
use crate::models::{
    CreateCustomerRequest, Customer, CustomerFilter, PaginatedResponse, SuccessResponse,
    UpdateCustomerRequest,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

/// GET /api/customers
pub async fn list_customers(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<CustomerFilter>,
) -> ApiResult<Json<PaginatedResponse<Customer>>> {
    let page = state.customers.list(claims.tid, &filter).await?;
    Ok(Json(PaginatedResponse::new("customers", page)))
}

/// GET /api/customers/{id}
pub async fn get_customer(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Customer>>> {
    let customer = state.customers.get(claims.tid, id).await?;
    Ok(Json(SuccessResponse::with_data("Customer found.", customer)))
}

/// POST /api/customers
pub async fn create_customer(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCustomerRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Customer>>)> {
    require_role(&claims, Role::Sales)?;
    req.validate()?;
    debug!("Creating customer: {}", req.name);

    let customer = state.customers.create(claims.tid, claims.sub, &req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Customer created successfully.", customer)),
    ))
}

/// PUT /api/customers/{id}
pub async fn update_customer(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCustomerRequest>,
) -> ApiResult<Json<SuccessResponse<Customer>>> {
    require_role(&claims, Role::Sales)?;
    req.validate()?;

    let customer = state.customers.update(claims.tid, claims.sub, id, &req).await?;
    Ok(Json(SuccessResponse::with_data("Customer updated successfully.", customer)))
}

/// DELETE /api/customers/{id}
///
/// Archives the customer; existing proposals keep pointing at it.
pub async fn delete_customer(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Customer>>> {
    require_role(&claims, Role::Sales)?;

    let customer = state.customers.archive(claims.tid, claims.sub, id).await?;
    Ok(Json(SuccessResponse::with_data("Customer archived.", customer)))
}
