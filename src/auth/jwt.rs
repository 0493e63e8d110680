//! JWT token management
//!
//! Handles creation, validation, and refresh of JWT tokens.

use crate::auth::Role;
use crate::config::AuthConfig;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Tenant the user belongs to
    pub tid: Uuid,
    pub email: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Token pair response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Signing keys and token lifetimes
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    /// Create access and refresh tokens for a user
    pub fn create_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let claims = |token_type: TokenType, ttl: Duration| Claims {
            sub: user_id,
            tid: tenant_id,
            email: email.to_string(),
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            token_type,
        };

        let access_token = self.sign(&claims(TokenType::Access, self.access_ttl))?;
        let refresh_token = self.sign(&claims(TokenType::Refresh, self.refresh_ttl))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Decode and validate a JWT token
    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Unauthorized("Invalid token".to_string())
                }
                _ => AppError::Unauthorized(format!("Token validation failed: {}", e)),
            })?;

        Ok(token_data.claims)
    }

    /// Decode a token and require it to be an access token
    pub fn decode_access(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_token(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".to_string()));
        }
        Ok(claims)
    }

    /// Decode a refresh token; the caller re-checks the user before re-issuing
    pub fn decode_refresh(&self, refresh_token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_token(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Unauthorized(
                "Invalid token type for refresh".to_string(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    #[test]
    fn test_access_token_round_trip() {
        let keys = keys();
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let pair = keys
            .create_tokens(user, tenant, "rep@acme.test", Role::Sales)
            .unwrap();

        let claims = keys.decode_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.tid, tenant);
        assert_eq!(claims.role, Role::Sales);
        assert_eq!(pair.expires_in, 15 * 60);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let keys = keys();
        let pair = keys
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "a@b.test", Role::Viewer)
            .unwrap();

        assert!(keys.decode_access(&pair.refresh_token).is_err());
        assert!(keys.decode_refresh(&pair.access_token).is_err());
        assert!(keys.decode_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let pair = keys()
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "a@b.test", Role::Admin)
            .unwrap();
        let other = JwtKeys::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..AuthConfig::default()
        });

        assert!(matches!(
            other.decode_token(&pair.access_token),
            Err(AppError::Unauthorized(_))
        ));
    }
}
