mod analysis;
mod auth;
mod config;
mod db;
mod errors;
mod mail;
mod models;
mod routes;
mod state;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::store::PgAnalysisStore;
use crate::auth::provisioning::reconcile_missing_stats;
use crate::auth::store::{IdentityStore, PgIdentityStore};
use crate::auth::sweep::{spawn_expiry_sweeper, SWEEP_INTERVAL};
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::mail::SmtpMailer;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration gate: nothing is started until every required value is present.
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    let mailer = SmtpMailer::new(&config.email)?;
    info!(
        host = %config.email.smtp_host,
        port = config.email.smtp_port,
        "SMTP mailer configured"
    );

    // Single initialization point for the database handle
    let db = create_pool(&config.database_url, config.db_timeout_secs).await?;
    run_migrations(&db).await?;

    let identity: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(db.clone()));
    reconcile_missing_stats(identity.as_ref()).await?;
    let sweeper = spawn_expiry_sweeper(identity.clone(), SWEEP_INTERVAL);

    let state = AppState {
        identity,
        mailer: Arc::new(mailer),
        analyses: Arc::new(PgAnalysisStore::new(db.clone())),
        config: config.clone(),
    };

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped; closing database pool");
    sweeper.abort();
    db.close().await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
