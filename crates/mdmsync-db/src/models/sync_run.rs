//! Sync run ledger model.
//!
//! Each reconciliation run is recorded when it starts (`in_progress`) and
//! finalized exactly once with its counters and error sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::DbError;

/// Selection rule of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Incremental,
    /// Explicit device ids, including retries of failed devices.
    Manual,
}

impl RunMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
            RunMode::Manual => "manual",
        }
    }

    /// Whether runs of this mode maintain a watermark.
    #[must_use]
    pub fn has_watermark(&self) -> bool {
        matches!(self, RunMode::Full | RunMode::Incremental)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(RunMode::Full),
            "incremental" => Ok(RunMode::Incremental),
            "manual" => Ok(RunMode::Manual),
            _ => Err(format!("Unknown run mode: {s}")),
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(RunStatus::InProgress),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {s}")),
        }
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Devices seen, including skipped and failed ones.
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, FromRow)]
struct SyncRunRow {
    id: Uuid,
    mode: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    processed: i64,
    created: i64,
    updated: i64,
    failed: i64,
    skipped: i64,
    duration_ms: Option<i64>,
    errors: Json<Vec<String>>,
    error_message: Option<String>,
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SyncRunRow {
    fn into_run(self) -> Result<SyncRun, DbError> {
        Ok(SyncRun {
            id: self.id,
            mode: self
                .mode
                .parse()
                .map_err(|e: String| DbError::corrupt("sync_runs", e))?,
            status: self
                .status
                .parse()
                .map_err(|e: String| DbError::corrupt("sync_runs", e))?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            counts: RunCounts {
                processed: to_u64(self.processed),
                created: to_u64(self.created),
                updated: to_u64(self.updated),
                failed: to_u64(self.failed),
                skipped: to_u64(self.skipped),
            },
            duration_ms: self.duration_ms.map(to_u64),
            errors: self.errors.0,
            error_message: self.error_message,
        })
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: RunCounts,
    pub duration_ms: Option<u64>,
    /// First error messages of the run.
    pub errors: Vec<String>,
    /// Run-fatal error, if any.
    pub error_message: Option<String>,
}

/// Final state written when a run ends.
#[derive(Debug, Clone)]
pub struct FinalizeSyncRun {
    pub status: RunStatus,
    pub counts: RunCounts,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl SyncRun {
    /// Record the start of a run.
    pub async fn start(
        pool: &SqlitePool,
        mode: RunMode,
        started_at: DateTime<Utc>,
    ) -> Result<Self, DbError> {
        let row: SyncRunRow = sqlx::query_as(
            r"
            INSERT INTO sync_runs (id, mode, status, started_at, errors)
            VALUES (?, ?, 'in_progress', ?, '[]')
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(mode.as_str())
        .bind(started_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.into_run()
    }

    /// Finalize a run that is still in progress.
    ///
    /// Returns [`DbError::RunNotOpen`] when the run does not exist or was
    /// already finalized.
    pub async fn finalize(
        pool: &SqlitePool,
        id: Uuid,
        input: &FinalizeSyncRun,
    ) -> Result<Self, DbError> {
        if input.status == RunStatus::InProgress {
            return Err(DbError::InvalidInput(
                "a run cannot be finalized as in_progress".to_string(),
            ));
        }

        let row: Option<SyncRunRow> = sqlx::query_as(
            r"
            UPDATE sync_runs
            SET status = ?,
                completed_at = ?,
                processed = ?,
                created = ?,
                updated = ?,
                failed = ?,
                skipped = ?,
                duration_ms = ?,
                errors = ?,
                error_message = ?
            WHERE id = ? AND status = 'in_progress'
            RETURNING *
            ",
        )
        .bind(input.status.as_str())
        .bind(input.completed_at)
        .bind(to_i64(input.counts.processed))
        .bind(to_i64(input.counts.created))
        .bind(to_i64(input.counts.updated))
        .bind(to_i64(input.counts.failed))
        .bind(to_i64(input.counts.skipped))
        .bind(to_i64(input.duration_ms))
        .bind(Json(&input.errors))
        .bind(input.error_message.as_deref())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.ok_or(DbError::RunNotOpen(id))?.into_run()
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row: Option<SyncRunRow> = sqlx::query_as(
            r"
            SELECT * FROM sync_runs WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.map(SyncRunRow::into_run).transpose()
    }

    /// Most recently started run.
    pub async fn latest(pool: &SqlitePool) -> Result<Option<Self>, DbError> {
        let row: Option<SyncRunRow> = sqlx::query_as(
            r"
            SELECT * FROM sync_runs
            ORDER BY started_at DESC
            LIMIT 1
            ",
        )
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.map(SyncRunRow::into_run).transpose()
    }

    /// Runs newest first.
    pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<Self>, DbError> {
        let rows: Vec<SyncRunRow> = sqlx::query_as(
            r"
            SELECT * FROM sync_runs
            ORDER BY started_at DESC
            LIMIT ?
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        rows.into_iter().map(SyncRunRow::into_run).collect()
    }

    /// Delete finished runs started before `cutoff`.
    pub async fn delete_finished_before(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"
            DELETE FROM sync_runs
            WHERE status != 'in_progress' AND started_at < ?
            ",
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("FULL".parse::<RunMode>().unwrap(), RunMode::Full);
        assert_eq!("manual".parse::<RunMode>().unwrap(), RunMode::Manual);
        assert!("retry".parse::<RunMode>().is_err());
        assert!(RunMode::Incremental.has_watermark());
        assert!(!RunMode::Manual.has_watermark());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::InProgress.to_string(), "in_progress");
        assert_eq!("in_progress".parse::<RunStatus>().unwrap(), RunStatus::InProgress);
    }
}
