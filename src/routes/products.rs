//! Product catalog route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::ApiResult;
use crate::models::{
    BulkDeleteRequest, BulkResult, CreateProductRequest, MessageResponse, PaginatedResponse,
    Product, ProductFilter, SuccessResponse, UpdateProductRequest, PRODUCTS_BULK,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// GET /api/products
///
/// Cached per tenant and filter until the next catalog write.
pub async fn list_products(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<PaginatedResponse<Product>>> {
    let page = state.products.list(claims.tid, &filter).await?;
    Ok(Json(PaginatedResponse::new("products", page)))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Product>>> {
    let product = state.products.get(claims.tid, id).await?;
    Ok(Json(SuccessResponse::with_data("Product found.", product)))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Product>>)> {
    require_role(&claims, Role::Manager)?;
    req.validate()?;

    let product = state.products.create(claims.tid, claims.sub, &req).await?;
    info!(product_id = %product.id, sku = %product.sku, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Product created successfully.", product)),
    ))
}

/// PUT /api/products/{id}
pub async fn update_product(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<SuccessResponse<Product>>> {
    require_role(&claims, Role::Manager)?;
    req.validate()?;

    let product = state.products.update(claims.tid, claims.sub, id, &req).await?;
    Ok(Json(SuccessResponse::with_data("Product updated successfully.", product)))
}

/// DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    require_role(&claims, Role::Manager)?;

    state.products.delete(claims.tid, claims.sub, id).await?;
    Ok(Json(MessageResponse::new("Product deleted.")))
}

/// POST /api/products/bulk-delete
pub async fn bulk_delete_products(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BulkDeleteRequest>,
) -> ApiResult<Json<SuccessResponse<BulkResult>>> {
    require_role(&claims, Role::Manager)?;
    req.validate()?;
    state.entitlements.require(claims.tid, PRODUCTS_BULK).await?;

    let result = state
        .products
        .bulk_delete(claims.tid, claims.sub, &req.ids)
        .await?;
    let message = format!(
        "{} deleted, {} failed.",
        result.succeeded.len(),
        result.failed.len()
    );
    Ok(Json(SuccessResponse::with_data(message, result)))
}
