//! Embedded schema migrations for `sync_records`, `sync_runs` and `sync_state`.

use sqlx::migrate::Migrator;
use tracing::info;

use crate::error::DbError;
use crate::pool::DbPool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations in filename order (`0001_`, `0002_`, ...).
///
/// Safe to call on every start; applied versions are skipped.
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    MIGRATOR
        .run(pool.inner())
        .await
        .map_err(DbError::MigrationFailed)?;

    info!(schema_version = latest_version(), "Database schema up to date");
    Ok(())
}

/// Highest migration version embedded in this build.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0)
}
