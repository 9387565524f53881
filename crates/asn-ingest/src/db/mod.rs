//! SQLite pool creation and schema migrations

pub mod ledger;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// SQLite's default limit on bound parameters per statement (3.32+)
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// Open (creating if needed) the database described by `config`
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(config.synchronous)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    tracing::info!(
        path = %config.path.display(),
        max_connections = config.max_connections,
        synchronous = ?config.synchronous,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the embedded migrations
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("Database migrations applied");
    Ok(())
}

/// Create the pool and bring the schema up to date
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = create_pool(config).await?;
    migrate(&pool).await?;
    Ok(pool)
}
