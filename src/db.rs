use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::error::{AppError, Result};

/// The bundled migrations, applied in order. Every statement is idempotent.
const MIGRATIONS: [(&str, &str); 2] = [
    ("001_schema", include_str!("../migrations/001_schema.sql")),
    ("002_solo_listing", include_str!("../migrations/002_solo_listing.sql")),
];

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
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(32)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_secs(5)))
        .create_timeout(Some(Duration::from_secs(2)))
        .recycle_timeout(Some(Duration::from_secs(1)))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build database pool: {}", e)))
}

/// Applies the bundled migrations.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client.batch_execute(sql).await?;
        tracing::debug!(migration = name, "applied");
    }
    tracing::info!("✅ Database schema is up to date");
    Ok(())
}
