//! Database connection and pool management.
//!
//! Opens a SeaORM connection pool (Postgres or SQLite) with configurable
//! parameters and brings the schema up to date.

use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::telemetry;

/// Errors raised while opening or preparing the database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to connect to database after {attempts} attempts: {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: DbErr,
    },
    #[error("invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("failed to apply migrations: {0}")]
    Migration(#[source] DbErr),
    #[error("database health check failed: {0}")]
    HealthCheck(#[source] DbErr),
}

/// How often and how patiently a pool connect is retried.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(100),
        }
    }
}

/// Opens the pool, retrying transient connect failures with exponential
/// backoff.
///
/// ```no_run
/// use catalog_ingest::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    init_pool_with(cfg, ConnectRetry::default()).await
}

pub async fn init_pool_with(
    cfg: &AppConfig,
    retry: ConnectRetry,
) -> Result<DatabaseConnection, DatabaseError> {
    if cfg.database_url.trim().is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "database URL cannot be empty".to_string(),
        });
    }
    if retry.attempts == 0 {
        return Err(DatabaseError::InvalidConfiguration {
            message: "at least one connect attempt is required".to_string(),
        });
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut delay = retry.initial_delay;
    let mut attempt = 1;
    loop {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(source) if attempt >= retry.attempts => {
                return Err(DatabaseError::ConnectionFailed {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Database connection failed, retrying"
                );
                telemetry::record_db_connect_retry();
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Applies all pending schema migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    Migrator::up(db, None)
        .await
        .map_err(DatabaseError::Migration)
}

/// Verifies the connection is alive with `SELECT 1`.
pub async fn health_check(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .map_err(DatabaseError::HealthCheck)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = AppConfig {
            database_url: "".to_string(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_configured_attempts() {
        let dir = TempDir::new().unwrap();
        let unreachable = dir.path().join("missing").join("catalog.db");
        let config = AppConfig {
            database_url: format!("sqlite://{}", unreachable.display()),
            db_max_connections: 1,
            db_acquire_timeout_ms: 500,
            ..AppConfig::default()
        };
        let retry = ConnectRetry {
            attempts: 2,
            initial_delay: Duration::from_millis(1),
        };

        let result = init_pool_with(&config, retry).await;
        assert!(matches!(
            result,
            Err(DatabaseError::ConnectionFailed { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_pool_migrates_and_answers_health_check() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.unwrap();
        migrate(&db).await.unwrap();
        health_check(&db).await.unwrap();
    }
}
