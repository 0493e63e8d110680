//! Authentication middleware
//!
//! Extracts and validates bearer tokens from requests.

use crate::auth::{Claims, Role};
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

/// Validate the bearer token and stash its claims in request extensions
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("Missing or malformed bearer token".to_string()))?;

    let claims = state.jwt.decode_access(bearer.token())?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Require at least the given role
pub fn require_role(claims: &Claims, required: Role) -> Result<(), AppError> {
    if claims.role < required {
        return Err(AppError::Forbidden(format!(
            "Requires {} role, you have {}",
            required, claims.role
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenType;
    use uuid::Uuid;

    fn claims_with(role: Role) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            tid: Uuid::new_v4(),
            email: "someone@tenant.test".to_string(),
            role,
            exp: 0,
            iat: 0,
            token_type: TokenType::Access,
        }
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&claims_with(Role::Admin), Role::Manager).is_ok());
        assert!(require_role(&claims_with(Role::Sales), Role::Sales).is_ok());
        assert!(matches!(
            require_role(&claims_with(Role::Viewer), Role::Sales),
            Err(AppError::Forbidden(_))
        ));
    }
}
