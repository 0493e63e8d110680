//! User management route handlers (per tenant)

use crate::auth::{hash_password, require_role, Claims, Role};
use crate::db::users::NewUser;
use crate::error::{ApiResult, AppError};
use crate::models::{
    normalize_email, CreateUserRequest, CreatedUserResponse, MessageResponse, Paginated,
    PaginatedResponse, SuccessResponse, UpdateUserRequest, UserFilter, UserResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

const TEMP_PASSWORD_LEN: usize = 16;

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// GET /api/users
pub async fn list_users(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Json<PaginatedResponse<UserResponse>>> {
    require_role(&claims, Role::Manager)?;

    let page = state.users.list(claims.tid, &filter).await?;
    let page = Paginated {
        items: page.items.into_iter().map(UserResponse::from).collect(),
        pagination: page.pagination,
    };
    Ok(Json(PaginatedResponse::new("users", page)))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<UserResponse>>> {
    require_role(&claims, Role::Manager)?;

    let user = state.users.get(claims.tid, id).await?;
    Ok(Json(SuccessResponse::with_data("User found.", user.into())))
}

/// POST /api/users
///
/// Admins add users to their organisation. Without a password, a temporary
/// one is generated and returned once.
pub async fn create_user(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<CreatedUserResponse>>)> {
    require_role(&claims, Role::Admin)?;
    req.validate()?;

    let (password, temporary_password) = match &req.password {
        Some(password) => (password.clone(), None),
        None => {
            let generated = generate_password();
            (generated.clone(), Some(generated))
        }
    };
    let password_hash = hash_password(&password)?;
    let email = normalize_email(&req.email);

    let user = state
        .users
        .create(
            claims.tid,
            claims.sub,
            NewUser {
                email: &email,
                password_hash: &password_hash,
                name: req.name.trim(),
                role: req.role,
            },
        )
        .await?;
    info!(user_id = %user.id, role = %user.role, "User created");

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "User created successfully.",
            CreatedUserResponse {
                user: user.into(),
                temporary_password,
            },
        )),
    ))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<SuccessResponse<UserResponse>>> {
    require_role(&claims, Role::Admin)?;
    req.validate()?;

    if id == claims.sub && (req.role.is_some_and(|r| r != Role::Admin) || req.is_active == Some(false)) {
        return Err(AppError::BadRequest(
            "You cannot demote or deactivate your own account".to_string(),
        ));
    }

    let user = state.users.update(claims.tid, claims.sub, id, &req).await?;
    Ok(Json(SuccessResponse::with_data("User updated successfully.", user.into())))
}

/// DELETE /api/users/{id}
///
/// Deactivates the account; history stays attributed.
pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    require_role(&claims, Role::Admin)?;

    state.users.deactivate(claims.tid, claims.sub, id).await?;
    Ok(Json(MessageResponse::new("User deactivated.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_password_shape() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), TEMP_PASSWORD_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
