//! PosalPro API - multi-tenant proposal management
//!
//! JSON REST service for proposals, products, customers, users and
//! per-tenant entitlements, backed by PostgreSQL. Two background tasks run
//! next to the HTTP server: a cache sweeper and the outbox drainer.

mod auth;
mod cache;
mod config;
mod db;
mod dedup;
mod error;
mod models;
mod outbox;
mod routes;
mod state;

use crate::auth::{hash_password, Role};
use crate::config::{Settings, DEV_JWT_SECRET};
use crate::db::users::NewUser;
use crate::outbox::OutboxExecutor;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    init_tracing(settings.json_logs);

    info!("Starting PosalPro API v{}", env!("CARGO_PKG_VERSION"));

    if settings.auth.jwt_secret == DEV_JWT_SECRET {
        warn!("JWT_SECRET not set, using the development secret (set it in production!)");
    }

    // Database pool, connectivity check and schema
    let pool = db::create_pool(&settings.database)?;
    db::verify_connection(&pool, &settings.database).await?;
    db::schema::bootstrap(&pool).await?;

    let state = Arc::new(AppState::new(pool, settings.clone()));
    bootstrap_admin(&state).await?;

    // Background tasks share one cancellation token
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    {
        let cache = state.cache.clone();
        let interval = settings.cache.sweep_interval;
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            cache.run_sweeper(interval, cancel).await;
        }));
    }

    if settings.outbox.enabled {
        let queue = Arc::new(state.outbox.clone());
        let executor = Arc::new(OutboxExecutor::new(state.cache.clone(), state.audit.clone()));
        tasks.push(tokio::spawn(outbox::run(
            queue,
            executor,
            settings.outbox.poll_interval,
            settings.outbox.batch_size,
            cancel.clone(),
        )));
    } else {
        warn!("Outbox drainer disabled (OUTBOX_ENABLED=false)");
    }

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("Server listening on http://{}", addr);

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,posalpro_api=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Create the first organisation and admin from BOOTSTRAP_ADMIN_* if the
/// email is not registered yet
async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (
        state.settings.auth.bootstrap_admin_email.as_deref(),
        state.settings.auth.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    let email = models::normalize_email(email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    let (tenant, user) = state
        .users
        .register_tenant_with_admin(
            "Default Organisation",
            NewUser {
                email: &email,
                password_hash: &password_hash,
                name: "Administrator",
                role: Role::Admin,
            },
        )
        .await?;
    info!(tenant_id = %tenant.id, user_id = %user.id, "Bootstrap admin created");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
