//! Errors of the sync database.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    /// The database file could not be opened or did not answer.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// Finalizing a run that does not exist or is already finished.
    #[error("Sync run {0} is not open")]
    RunNotOpen(Uuid),

    /// A caller passed a value the store refuses to persist.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored row holds a value this build cannot read back.
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow {
        table: &'static str,
        message: String,
    },
}

impl DbError {
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// SQLite reported the database as locked or busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::QueryFailed(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some("5" | "6"))
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_run_not_open(&self) -> bool {
        matches!(self, DbError::RunNotOpen(_))
    }

    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, DbError::InvalidInput(_))
    }

    pub(crate) fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        DbError::CorruptRow {
            table,
            message: message.into(),
        }
    }
}
