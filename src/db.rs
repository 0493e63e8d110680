//! Database connection management
//!
//! Builds the PostgreSQL connection pool and hosts the per-entity services.
//! Every service method scopes its statements by tenant.

pub mod audit;
pub mod customers;
pub mod entitlements;
pub mod filter;
pub mod outbox;
pub mod products;
pub mod proposals;
pub mod schema;
pub mod users;

pub use audit::AuditService;
pub use customers::CustomerService;
pub use entitlements::EntitlementService;
pub use outbox::OutboxService;
pub use products::ProductService;
pub use proposals::ProposalService;
pub use users::UserService;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::str::FromStr;
use tokio_postgres::{NoTls, Row};
use tracing::info;

/// Create a connection pool (connections are opened lazily)
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    };

    pool.map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))
}

/// Check that the pool can reach the database
pub async fn verify_connection(pool: &Pool, config: &DatabaseConfig) -> Result<(), AppError> {
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    info!(
        host = %config.host,
        database = %config.database,
        tls = config.require_tls,
        "Database connection successful"
    );
    Ok(())
}

/// Read a TEXT column into an enum
pub(crate) fn text_column<T>(row: &Row, column: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e| AppError::Internal(format!("Bad value in column {}: {}", column, e)))
}

/// Read a JSONB column into a typed value
pub(crate) fn json_column<T>(row: &Row, column: &str) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned,
{
    let raw: serde_json::Value = row.try_get(column)?;
    serde_json::from_value(raw)
        .map_err(|e| AppError::Internal(format!("Bad JSON in column {}: {}", column, e)))
}
