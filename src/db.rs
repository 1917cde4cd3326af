use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use crate::error::{AppError, Result};
use std::time::Duration;

/// The schema, applied on every startup. Every statement is idempotent.
const INIT_SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// The maximum number of pooled connections.
const MAX_POOL_SIZE: usize = 32;

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    if let Some(tokio_postgres::config::Host::Tcp(hostname)) = pg_config.get_hosts().first() {
        cfg.host = Some(hostname.to_string());
    }

    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }

    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }

    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: MAX_POOL_SIZE,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AppError::Internal(format!("Failed to create pool: {}", e)))
}

/// Creates the tables and indexes the metadata store relies on.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(INIT_SCHEMA).await.map_err(|e| {
        tracing::error!("❌ Schema bootstrap failed: {}", e);
        AppError::from(e)
    })?;

    tracing::info!("✅ Database schema is up to date");
    Ok(())
}
