//! Persistence boundary of the engine.
//!
//! The engine only reaches local storage through [`DeviceRecordStore`] and
//! [`RunLedger`]. [`SqliteStore`] implements both over the `mdmsync-db` models.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdmsync_db::{
    DbPool, FinalizeSyncRun, RecordStatistics, RunMode, SyncRecord, SyncRun, SyncStatus,
    SyncWatermark, UpsertSyncRecord,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::SyncResult;
use crate::fingerprint::Fingerprint;

/// Per-device sync state.
#[async_trait]
pub trait DeviceRecordStore: Send + Sync {
    async fn get(&self, external_id: &str) -> SyncResult<Option<SyncRecord>>;

    /// Create or update the record of `external_id`.
    ///
    /// On success the fingerprint is stored and the error cleared. On
    /// failure the previous fingerprint is kept and the retry count grows.
    async fn upsert(
        &self,
        external_id: &str,
        target_id: Option<i64>,
        fingerprint: &Fingerprint,
        status: SyncStatus,
        error: Option<&str>,
    ) -> SyncResult<SyncRecord>;

    /// Most recently updated failed records.
    async fn list_failed(&self, limit: u32) -> SyncResult<Vec<SyncRecord>>;

    /// Delete successful records and finished runs older than `older_than`.
    /// Failed records are kept regardless of age.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> SyncResult<u64>;

    async fn statistics(&self) -> SyncResult<RecordStatistics>;
}

/// Audit ledger of runs plus the watermarks of incremental selection.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn start_run(&self, mode: RunMode, started_at: DateTime<Utc>) -> SyncResult<SyncRun>;

    async fn finish_run(&self, id: Uuid, outcome: &FinalizeSyncRun) -> SyncResult<SyncRun>;

    async fn latest_run(&self) -> SyncResult<Option<SyncRun>>;

    async fn recent_runs(&self, limit: u32) -> SyncResult<Vec<SyncRun>>;

    async fn watermark(&self, mode: RunMode) -> SyncResult<Option<DateTime<Utc>>>;

    async fn set_watermark(&self, mode: RunMode, at: DateTime<Utc>) -> SyncResult<()>;
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DeviceRecordStore for SqliteStore {
    async fn get(&self, external_id: &str) -> SyncResult<Option<SyncRecord>> {
        Ok(SyncRecord::find(self.pool.inner(), external_id).await?)
    }

    #[instrument(skip(self, fingerprint, error))]
    async fn upsert(
        &self,
        external_id: &str,
        target_id: Option<i64>,
        fingerprint: &Fingerprint,
        status: SyncStatus,
        error: Option<&str>,
    ) -> SyncResult<SyncRecord> {
        let input = UpsertSyncRecord {
            external_id,
            target_id,
            fingerprint: Some(fingerprint.as_str()),
            status,
            error,
        };
        let record = SyncRecord::upsert(self.pool.inner(), &input, Utc::now()).await?;
        debug!(retry_count = record.retry_count, "Sync record stored");
        Ok(record)
    }

    async fn list_failed(&self, limit: u32) -> SyncResult<Vec<SyncRecord>> {
        Ok(SyncRecord::list_failed(self.pool.inner(), limit).await?)
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, older_than: DateTime<Utc>) -> SyncResult<u64> {
        let records = SyncRecord::delete_successful_before(self.pool.inner(), older_than).await?;
        let runs = SyncRun::delete_finished_before(self.pool.inner(), older_than).await?;

        info!(
            records_deleted = records,
            runs_deleted = runs,
            "Retention cleanup finished"
        );
        Ok(records + runs)
    }

    async fn statistics(&self) -> SyncResult<RecordStatistics> {
        Ok(SyncRecord::statistics(self.pool.inner()).await?)
    }
}

#[async_trait]
impl RunLedger for SqliteStore {
    async fn start_run(&self, mode: RunMode, started_at: DateTime<Utc>) -> SyncResult<SyncRun> {
        Ok(SyncRun::start(self.pool.inner(), mode, started_at).await?)
    }

    async fn finish_run(&self, id: Uuid, outcome: &FinalizeSyncRun) -> SyncResult<SyncRun> {
        Ok(SyncRun::finalize(self.pool.inner(), id, outcome).await?)
    }

    async fn latest_run(&self) -> SyncResult<Option<SyncRun>> {
        Ok(SyncRun::latest(self.pool.inner()).await?)
    }

    async fn recent_runs(&self, limit: u32) -> SyncResult<Vec<SyncRun>> {
        Ok(SyncRun::list_recent(self.pool.inner(), limit).await?)
    }

    async fn watermark(&self, mode: RunMode) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(SyncWatermark::get(self.pool.inner(), mode).await?)
    }

    async fn set_watermark(&self, mode: RunMode, at: DateTime<Utc>) -> SyncResult<()> {
        Ok(SyncWatermark::set(self.pool.inner(), mode, at).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mdmsync_db::{run_migrations, RunCounts, RunStatus};

    async fn store() -> SqliteStore {
        let pool = DbPool::in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn fp(value: &str) -> Fingerprint {
        let device = mdmsync_connector::SourceDevice::new("x", value).unwrap();
        crate::fingerprint::fingerprint(&device)
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = store().await;
        let fingerprint = fp("a");

        store
            .upsert("dev-1", Some(5), &fingerprint, SyncStatus::Success, None)
            .await
            .unwrap();

        let record = store.get("dev-1").await.unwrap().unwrap();
        assert_eq!(record.target_id, Some(5));
        assert!(fingerprint.matches(record.last_fingerprint.as_deref()));
        assert!(store.get("dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_counts_records_and_runs() {
        let store = store().await;
        let old = Utc::now() - Duration::days(45);

        let input = UpsertSyncRecord {
            external_id: "old",
            target_id: Some(1),
            fingerprint: Some("fp"),
            status: SyncStatus::Success,
            error: None,
        };
        SyncRecord::upsert(store.pool().inner(), &input, old)
            .await
            .unwrap();

        let run = store.start_run(RunMode::Full, old).await.unwrap();
        store
            .finish_run(
                run.id,
                &FinalizeSyncRun {
                    status: RunStatus::Success,
                    counts: RunCounts::default(),
                    duration_ms: 10,
                    errors: vec![],
                    error_message: None,
                    completed_at: old,
                },
            )
            .await
            .unwrap();

        let deleted = store
            .cleanup(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.latest_run().await.unwrap().is_none());
    }
}
