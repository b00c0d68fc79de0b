//! Sync record model.
//!
//! One row per MDM device id: GLPI id, fingerprint of the last successful
//! sync, status and retry bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::DbError;

/// Sync status of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {s}")),
        }
    }
}

/// Raw row as stored in `sync_records`.
#[derive(Debug, Clone, FromRow)]
struct SyncRecordRow {
    external_id: String,
    target_id: Option<i64>,
    last_fingerprint: Option<String>,
    status: String,
    last_error: Option<String>,
    retry_count: i64,
    last_success_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SyncRecordRow {
    fn into_record(self) -> Result<SyncRecord, DbError> {
        let status = self
            .status
            .parse()
            .map_err(|e: String| DbError::corrupt("sync_records", e))?;
        Ok(SyncRecord {
            external_id: self.external_id,
            target_id: self.target_id,
            last_fingerprint: self.last_fingerprint,
            status,
            last_error: self.last_error,
            retry_count: u32::try_from(self.retry_count).unwrap_or(0),
            last_success_at: self.last_success_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Sync bookkeeping for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub external_id: String,
    /// GLPI id, unknown until the first successful create.
    pub target_id: Option<i64>,
    /// Fingerprint of the last successfully synced snapshot.
    pub last_fingerprint: Option<String>,
    pub status: SyncStatus,
    pub last_error: Option<String>,
    /// Consecutive failed attempts since the last success.
    pub retry_count: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one sync attempt.
#[derive(Debug, Clone)]
pub struct UpsertSyncRecord<'a> {
    pub external_id: &'a str,
    /// `None` keeps the stored id.
    pub target_id: Option<i64>,
    /// Stored only when `status` is `Success`.
    pub fingerprint: Option<&'a str>,
    pub status: SyncStatus,
    /// Ignored (cleared) when `status` is `Success`.
    pub error: Option<&'a str>,
}

/// Record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatistics {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub pending: u64,
}

impl RecordStatistics {
    /// Share of successful records in percent, rounded to two decimals.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let rate = self.success as f64 / self.total as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

#[derive(Debug, FromRow)]
struct StatisticsRow {
    total: i64,
    success: i64,
    failed: i64,
    pending: i64,
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SyncRecord {
    /// Find the record for an external id.
    pub async fn find(pool: &SqlitePool, external_id: &str) -> Result<Option<Self>, DbError> {
        let row: Option<SyncRecordRow> = sqlx::query_as(
            r"
            SELECT * FROM sync_records
            WHERE external_id = ?
            ",
        )
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.map(SyncRecordRow::into_record).transpose()
    }

    /// Insert or update the record for one attempt.
    ///
    /// On success the fingerprint is overwritten, the error cleared and the
    /// retry count reset. On failure the previous fingerprint is kept and the
    /// retry count incremented.
    pub async fn upsert(
        pool: &SqlitePool,
        input: &UpsertSyncRecord<'_>,
        now: DateTime<Utc>,
    ) -> Result<Self, DbError> {
        if input.external_id.trim().is_empty() {
            return Err(DbError::InvalidInput(
                "external id must not be empty".to_string(),
            ));
        }

        let succeeded = input.status == SyncStatus::Success;
        let fingerprint = if succeeded { input.fingerprint } else { None };
        let error = if succeeded { None } else { input.error };
        let initial_retries: i64 = if input.status == SyncStatus::Failed { 1 } else { 0 };
        let last_success_at = succeeded.then_some(now);

        let row: SyncRecordRow = sqlx::query_as(
            r"
            INSERT INTO sync_records (
                external_id, target_id, last_fingerprint, status, last_error,
                retry_count, last_success_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (external_id) DO UPDATE SET
                target_id = COALESCE(excluded.target_id, sync_records.target_id),
                last_fingerprint = CASE
                    WHEN excluded.status = 'success' THEN excluded.last_fingerprint
                    ELSE sync_records.last_fingerprint
                END,
                status = excluded.status,
                last_error = excluded.last_error,
                retry_count = CASE
                    WHEN excluded.status = 'success' THEN 0
                    WHEN excluded.status = 'failed' THEN sync_records.retry_count + 1
                    ELSE sync_records.retry_count
                END,
                last_success_at = COALESCE(excluded.last_success_at, sync_records.last_success_at),
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(input.external_id)
        .bind(input.target_id)
        .bind(fingerprint)
        .bind(input.status.as_str())
        .bind(error)
        .bind(initial_retries)
        .bind(last_success_at)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        row.into_record()
    }

    /// Most recently updated failed records.
    pub async fn list_failed(pool: &SqlitePool, limit: u32) -> Result<Vec<Self>, DbError> {
        let rows: Vec<SyncRecordRow> = sqlx::query_as(
            r"
            SELECT * FROM sync_records
            WHERE status = 'failed'
            ORDER BY updated_at DESC
            LIMIT ?
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        rows.into_iter().map(SyncRecordRow::into_record).collect()
    }

    /// Delete successful records last updated before `cutoff`. Failed and
    /// pending records are never deleted here.
    pub async fn delete_successful_before(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"
            DELETE FROM sync_records
            WHERE status = 'success' AND updated_at < ?
            ",
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected())
    }

    /// Counts by status.
    pub async fn statistics(pool: &SqlitePool) -> Result<RecordStatistics, DbError> {
        let row: StatisticsRow = sqlx::query_as(
            r"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS success,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending
            FROM sync_records
            ",
        )
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(RecordStatistics {
            total: to_u64(row.total),
            success: to_u64(row.success),
            failed: to_u64(row.failed),
            pending: to_u64(row.pending),
        })
    }
}
