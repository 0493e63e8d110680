//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod admin;
mod auth;
mod customers;
mod dashboard;
mod entitlements;
mod products;
mod proposals;
mod users;

use crate::auth::auth_middleware;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    let public = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh));

    let protected = Router::new()
        .route("/api/auth/me", get(auth::me))
        // Users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Customers
        .route(
            "/api/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/api/customers/{id}",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        // Products
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/api/products/bulk-delete", post(products::bulk_delete_products))
        .route(
            "/api/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Proposals
        .route(
            "/api/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route("/api/proposals/bulk-status", post(proposals::bulk_status))
        .route(
            "/api/proposals/{id}",
            get(proposals::get_proposal)
                .put(proposals::update_proposal)
                .delete(proposals::delete_proposal),
        )
        .route("/api/proposals/{id}/status", post(proposals::change_status))
        .route("/api/proposals/{id}/versions", get(proposals::list_versions))
        // Dashboard
        .route("/api/dashboard/stats", get(dashboard::get_stats))
        // Entitlements
        .route("/api/entitlements", get(entitlements::list_entitlements))
        .route(
            "/api/entitlements/{key}",
            get(entitlements::get_entitlement).put(entitlements::put_entitlement),
        )
        // Admin
        .route("/api/audit", get(admin::list_audit))
        .route("/api/admin/outbox", get(admin::list_outbox))
        .route("/api/admin/outbox/{id}/retry", post(admin::retry_outbox_job))
        .route(
            "/api/admin/cache",
            get(admin::cache_stats).delete(admin::flush_cache),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .merge(public)
        .merge(protected)
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];

    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint; reports pool occupancy without touching the database
async fn health_check(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    let pool = state.db_pool.status();
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "pool": {
            "maxSize": pool.max_size,
            "size": pool.size,
            "available": pool.available,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::cache::CacheService;
    use crate::state::AppState;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (Router, SharedState) {
        let settings = Settings::default();
        // Pools connect lazily, so no database is touched unless a handler runs a query
        let pool = crate::db::create_pool(&settings.database).unwrap();
        let state = Arc::new(AppState::new(pool, settings.clone()));
        (create_router(state.clone(), &settings), state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["pool"]["size"], 0);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/api/proposals").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (app, state) = app();
        let tokens = state
            .jwt
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "a@b.test", Role::Admin)
            .unwrap();

        let response = app
            .oneshot(
                Request::get("/api/admin/cache")
                    .header("authorization", format!("Bearer {}", tokens.refresh_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cache_stats_without_database() {
        let (app, state) = app();
        let tokens = state
            .jwt
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "a@b.test", Role::Admin)
            .unwrap();

        let response = app
            .oneshot(
                Request::get("/api/admin/cache")
                    .header("authorization", format!("Bearer {}", tokens.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["entries"], 0);
        assert_eq!(body["data"]["dedupInFlight"], 0);
    }

    #[tokio::test]
    async fn test_flush_cache_only_touches_own_tenant() {
        let (app, state) = app();
        let (mine, other) = (Uuid::new_v4(), Uuid::new_v4());
        state
            .cache
            .set(CacheService::tenant_key(mine, "products", "list"), serde_json::json!([]))
            .await;
        state
            .cache
            .set(CacheService::tenant_key(other, "products", "list"), serde_json::json!([]))
            .await;
        let tokens = state
            .jwt
            .create_tokens(Uuid::new_v4(), mine, "a@b.test", Role::Admin)
            .unwrap();

        let response = app
            .oneshot(
                Request::delete("/api/admin/cache")
                    .header("authorization", format!("Bearer {}", tokens.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["removed"], 1);
        assert_eq!(state.cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_role_is_enforced() {
        let (app, state) = app();
        let tokens = state
            .jwt
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "v@b.test", Role::Viewer)
            .unwrap();

        let response = app
            .oneshot(
                Request::get("/api/admin/cache")
                    .header("authorization", format!("Bearer {}", tokens.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_body_is_rejected_before_the_database() {
        let (app, state) = app();
        let tokens = state
            .jwt
            .create_tokens(Uuid::new_v4(), Uuid::new_v4(), "m@b.test", Role::Manager)
            .unwrap();

        let response = app
            .oneshot(
                Request::post("/api/products")
                    .header("authorization", format!("Bearer {}", tokens.access_token))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"sku":"-","name":"","priceCents":-5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
