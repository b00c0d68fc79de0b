//! Connection pool.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::DbError;

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared SQLite pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open `url` with the default pool size.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectionFailed`] when the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Open `url` (e.g. `sqlite://data/mdmsync.db`), creating the file and its
    /// directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectionFailed`] when the URL is malformed or the
    /// database cannot be opened.
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(DbError::ConnectionFailed)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::ConnectionFailed(sqlx::Error::Io(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(DbError::ConnectionFailed)?;

        info!(url = %url, max_connections = max_connections, "Database pool opened");
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires,
    /// so every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectionFailed`] when SQLite cannot be initialized.
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::ConnectionFailed)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::ConnectionFailed)?;

        Ok(Self { pool })
    }

    /// Underlying `SQLx` pool.
    #[must_use]
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectionFailed`] when the database does not answer.
    pub async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
