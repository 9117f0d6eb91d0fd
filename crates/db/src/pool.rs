//! Postgres connection pool and migrations.

use std::time::Duration;

use engine::Configuration;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::{DbError, PgClient};

/// Type alias for the shared Postgres pool used across the whole application.
pub type DbPool = PgPool;

/// Open a pool of at most `max_connections` connections to `database_url`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Client for the database named by `config.database_url`, sized so every
/// concurrent cascade can hold a connection.
pub async fn connect(config: &Configuration) -> Result<PgClient, DbError> {
    let url = config.database_url.as_deref().ok_or(DbError::MissingDatabaseUrl)?;
    let max_connections = u32::try_from(config.concurrency.max(1)).unwrap_or(u32::MAX);
    Ok(PgClient::new(create_pool(url, max_connections).await?))
}

/// Apply the migrations embedded from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
