use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

/// Creates the process-wide PostgreSQL pool. This is the single place the
/// database handle is built; everything else receives it through `AppState`.
///
/// `timeout_secs` bounds both pool checkout and every statement on the server.
pub async fn create_pool(database_url: &str, timeout_secs: u64) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let statement_timeout = format!("{}s", timeout_secs);
    let options = PgConnectOptions::from_str(database_url)
        .context("DATABASE_URL is not a valid Postgres URL")?
        .options([("statement_timeout", statement_timeout.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(timeout_secs))
        .connect_with(options)
        .await
        .context("connect to database")?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run database migrations")?;
    info!("Database migrations applied");
    Ok(())
}
