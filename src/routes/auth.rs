//! Authentication route handlers
//!
//! Provides register, login, refresh and current-user endpoints.

use crate::auth::{hash_password, verify_password, Claims, Role, TokenPair};
use crate::db::users::NewUser;
use crate::error::{ApiResult, AppError};
use crate::models::{
    normalize_email, LoginRequest, NewAudit, RefreshRequest, RegisterRequest, SuccessResponse,
    Tenant, UserResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: UserResponse,
    pub tokens: TokenPair,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Tenant>,
}

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// POST /api/auth/register
///
/// Create an organisation and its first admin, then sign the admin in.
pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<AuthData>>)> {
    req.validate()?;
    let email = normalize_email(&req.email);
    debug!(email = %email, "Registering tenant: {}", req.tenant_name);

    let password_hash = hash_password(&req.password)?;
    let (tenant, user) = state
        .users
        .register_tenant_with_admin(
            req.tenant_name.trim(),
            NewUser {
                email: &email,
                password_hash: &password_hash,
                name: req.name.trim(),
                role: Role::Admin,
            },
        )
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
            other => other,
        })?;

    let tokens = state
        .jwt
        .create_tokens(user.id, tenant.id, &user.email, user.role)?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "Organisation registered successfully.",
            AuthData {
                user: user.into(),
                tokens,
                tenant: Some(tenant),
            },
        )),
    ))
}

/// POST /api/auth/login
///
/// Authenticate with email and password, receive JWT tokens.
pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SuccessResponse<AuthData>>> {
    let email = normalize_email(&req.email);

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }
    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    state.users.touch_last_login(user.id).await?;
    state
        .audit
        .record_standalone(NewAudit::new(user.tenant_id, "user", "user.login").by(user.id).on(user.id))
        .await?;

    let tokens = state
        .jwt
        .create_tokens(user.id, user.tenant_id, &user.email, user.role)?;
    info!(user_id = %user.id, tenant_id = %user.tenant_id, "User logged in");

    Ok(Json(SuccessResponse::with_data(
        "Login successful.",
        AuthData {
            user: user.into(),
            tokens,
            tenant: None,
        },
    )))
}

/// POST /api/auth/refresh
///
/// Exchange a refresh token for a new token pair. The role is re-read from
/// the database so demotions take effect on the next refresh.
pub async fn refresh(
    State(state): State<SharedState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<SuccessResponse<TokenPair>>> {
    let claims = state.jwt.decode_refresh(&req.refresh_token)?;

    let user = state
        .users
        .find_by_id(claims.tid, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User no longer exists or is inactive".to_string()))?;

    let tokens = state
        .jwt
        .create_tokens(user.id, user.tenant_id, &user.email, user.role)?;

    Ok(Json(SuccessResponse::with_data("Token refreshed.", tokens)))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<UserResponse>>> {
    let user = state
        .users
        .find_by_id(claims.tid, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(Json(SuccessResponse::with_data("Current user.", user.into())))
}
