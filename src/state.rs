//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::auth::JwtKeys;
use crate::cache::CacheService;
use crate::config::Settings;
use crate::db::{
    AuditService, CustomerService, EntitlementService, OutboxService, ProductService,
    ProposalService, UserService,
};
use crate::dedup::RequestDeduplicator;
use crate::models::DashboardStats;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Database connection pool
    pub db_pool: Pool,

    pub users: UserService,
    pub customers: CustomerService,
    pub products: ProductService,
    pub proposals: ProposalService,
    pub entitlements: EntitlementService,
    pub audit: AuditService,
    pub outbox: OutboxService,

    /// Token signing and verification keys
    pub jwt: JwtKeys,

    /// Process-local TTL cache, shared with the background sweeper and outbox
    pub cache: Arc<CacheService>,

    /// Collapses concurrent identical dashboard requests
    pub dashboard_dedup: RequestDeduplicator<DashboardStats>,

    pub settings: Settings,
}

impl AppState {
    pub fn new(pool: Pool, settings: Settings) -> Self {
        let cache = Arc::new(CacheService::new(settings.cache.default_ttl));

        Self {
            users: UserService::new(pool.clone()),
            customers: CustomerService::new(pool.clone()),
            products: ProductService::new(pool.clone(), cache.clone()),
            proposals: ProposalService::new(pool.clone(), cache.clone()),
            entitlements: EntitlementService::new(pool.clone(), cache.clone()),
            audit: AuditService::new(pool.clone()),
            outbox: OutboxService::new(pool.clone()),
            jwt: JwtKeys::new(&settings.auth),
            dashboard_dedup: RequestDeduplicator::new(settings.cache.dedup_window),
            cache,
            db_pool: pool,
            settings,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
