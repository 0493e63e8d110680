//! Proposal route handlers
//!
//! CRUD, workflow transitions, version history and bulk status changes.

use crate::auth::{require_role, Claims, Role};
use crate::db::proposals::Actor;
use crate::error::ApiResult;
use crate::models::{
    BulkResult, BulkStatusRequest, CreateProposalRequest, MessageResponse, PaginatedResponse,
    Proposal, ProposalFilter, ProposalVersion, StatusChangeRequest, SuccessResponse,
    UpdateProposalRequest, PROPOSALS_BULK, PROPOSALS_VERSIONING,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

fn actor(claims: &Claims) -> Actor {
    Actor {
        tenant_id: claims.tid,
        user_id: claims.sub,
        role: claims.role,
    }
}

/// GET /api/proposals
pub async fn list_proposals(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<ProposalFilter>,
) -> ApiResult<Json<PaginatedResponse<Proposal>>> {
    let page = state.proposals.list(claims.tid, &filter).await?;
    Ok(Json(PaginatedResponse::new("proposals", page)))
}

/// GET /api/proposals/{id}
pub async fn get_proposal(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    let proposal = state.proposals.get(claims.tid, id).await?;
    Ok(Json(SuccessResponse::with_data("Proposal found.", proposal)))
}

/// POST /api/proposals
pub async fn create_proposal(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Proposal>>)> {
    require_role(&claims, Role::Sales)?;
    req.validate()?;
    debug!("Creating proposal: {}", req.title);

    let proposal = state.proposals.create(actor(&claims), &req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Proposal created successfully.", proposal)),
    ))
}

/// PUT /api/proposals/{id}
pub async fn update_proposal(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProposalRequest>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    require_role(&claims, Role::Sales)?;
    req.validate()?;

    let proposal = state.proposals.update(actor(&claims), id, &req).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Proposal updated to version {}.", proposal.version),
        proposal,
    )))
}

/// DELETE /api/proposals/{id}
pub async fn delete_proposal(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    require_role(&claims, Role::Sales)?;

    state.proposals.delete(actor(&claims), id).await?;
    Ok(Json(MessageResponse::new("Proposal deleted.")))
}

/// POST /api/proposals/{id}/status
///
/// Approving or rejecting needs a manager; the workflow decides the rest.
pub async fn change_status(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    require_role(&claims, Role::Sales)?;
    req.validate()?;

    let proposal = state
        .proposals
        .transition(actor(&claims), id, req.status, req.comment.as_deref())
        .await?;
    info!(proposal_id = %id, status = %proposal.status, "Proposal status changed");

    Ok(Json(SuccessResponse::with_data(
        format!("Proposal is now {}.", proposal.status),
        proposal,
    )))
}

/// GET /api/proposals/{id}/versions
pub async fn list_versions(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<ProposalVersion>>>> {
    state
        .entitlements
        .require(claims.tid, PROPOSALS_VERSIONING)
        .await?;

    let versions = state.proposals.versions(claims.tid, id).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} versions found.", versions.len()),
        versions,
    )))
}

/// POST /api/proposals/bulk-status
pub async fn bulk_status(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BulkStatusRequest>,
) -> ApiResult<Json<SuccessResponse<BulkResult>>> {
    require_role(&claims, Role::Manager)?;
    req.validate()?;
    state.entitlements.require(claims.tid, PROPOSALS_BULK).await?;

    let result = state
        .proposals
        .bulk_transition(actor(&claims), &req.ids, req.status)
        .await?;
    let message = format!(
        "{} updated, {} failed.",
        result.succeeded.len(),
        result.failed.len()
    );
    Ok(Json(SuccessResponse::with_data(message, result)))
}
