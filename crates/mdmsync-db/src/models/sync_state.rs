//! Watermarks for incremental selection.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::sync_run::RunMode;

/// End time of the last successful run per mode.
pub struct SyncWatermark;

impl SyncWatermark {
    pub async fn get(pool: &SqlitePool, mode: RunMode) -> Result<Option<DateTime<Utc>>, DbError> {
        sqlx::query_scalar(
            r"
            SELECT last_run_end FROM sync_state WHERE mode = ?
            ",
        )
        .bind(mode.as_str())
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Store the watermark for a full or incremental run.
    pub async fn set(
        pool: &SqlitePool,
        mode: RunMode,
        last_run_end: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if !mode.has_watermark() {
            return Err(DbError::InvalidInput(format!(
                "{mode} runs do not keep a watermark"
            )));
        }

        sqlx::query(
            r"
            INSERT INTO sync_state (mode, last_run_end, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (mode) DO UPDATE SET
                last_run_end = excluded.last_run_end,
                updated_at = excluded.updated_at
            ",
        )
        .bind(mode.as_str())
        .bind(last_run_end)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }
}
