//! Reconciliation engine orchestrator.
//!
//! Main entry point for full, incremental and manual sync runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use mdmsync_connector::{AdaptiveRateLimiter, SourceConnector, SourceDevice, TargetConnector};
use mdmsync_db::{FinalizeSyncRun, RunMode, RunStatus, SyncRecord, SyncRun, SyncStatus};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{truncate, SyncError, SyncResult};
use crate::fingerprint::fingerprint;
use crate::statistics::{RunStatistics, SyncRunResult};
use crate::status::{LastRun, RunState, SyncStatusReport};
use crate::store::{DeviceRecordStore, RunLedger};

/// Which devices a run considers.
#[derive(Debug, Clone)]
enum Selection {
    All,
    ModifiedSinceWatermark,
    Ids(Vec<String>),
}

/// Holds the process-wide run flag for the lifetime of one run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Outcome of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceOutcome {
    Skipped,
    Created,
    Updated,
    Failed,
}

/// Reconciliation engine. One instance per process, shared behind an `Arc`.
pub struct ReconciliationEngine {
    source: Arc<dyn SourceConnector>,
    target: Arc<dyn TargetConnector>,
    records: Arc<dyn DeviceRecordStore>,
    ledger: Arc<dyn RunLedger>,
    limiter: AdaptiveRateLimiter,
    config: SyncConfig,
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("source", &self.source.display_name())
            .field("target", &self.target.display_name())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Create an engine after validating `config`.
    pub fn new(
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
        records: Arc<dyn DeviceRecordStore>,
        ledger: Arc<dyn RunLedger>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        let limiter = AdaptiveRateLimiter::new(config.rate_limit, config.rate_window());

        Ok(Self {
            source,
            target,
            records,
            ledger,
            limiter,
            config,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Limiter shared by every target upsert.
    #[must_use]
    pub fn rate_limiter(&self) -> &AdaptiveRateLimiter {
        &self.limiter
    }

    /// Whether a run is active in this process.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the active run to stop at the next batch boundary.
    ///
    /// Returns `false` when no run is active.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel_requested.store(true, Ordering::Release);
        info!("Cancellation requested for the active sync run");
        true
    }

    /// Verify both remote systems.
    pub async fn test_connection(&self) -> SyncResult<()> {
        let (source, target) =
            tokio::join!(self.source.test_connection(), self.target.test_connection());

        source.map_err(|e| SyncError::unreachable(self.source.display_name(), &e))?;
        target.map_err(|e| SyncError::unreachable(self.target.display_name(), &e))?;
        Ok(())
    }

    /// Sync every device known to the source.
    pub async fn run_full(&self) -> SyncResult<SyncRunResult> {
        self.execute(RunMode::Full, Selection::All).await
    }

    /// Sync devices modified since the last successful run, minus the buffer.
    pub async fn run_incremental(&self) -> SyncResult<SyncRunResult> {
        self.execute(RunMode::Incremental, Selection::ModifiedSinceWatermark)
            .await
    }

    /// Sync the given devices regardless of modification time.
    pub async fn run_manual(&self, external_ids: &[String]) -> SyncResult<SyncRunResult> {
        let ids = normalize_ids(external_ids);
        if ids.is_empty() {
            return Ok(SyncRunResult::empty(RunMode::Manual));
        }
        self.execute(RunMode::Manual, Selection::Ids(ids)).await
    }

    /// Re-sync currently failed devices, optionally only those in `only`.
    pub async fn retry_failed(&self, only: Option<&[String]>) -> SyncResult<SyncRunResult> {
        if self.is_running() {
            return Err(SyncError::ConcurrentRun);
        }

        let wanted: Option<HashSet<String>> = only.map(|ids| normalize_ids(ids).into_iter().collect());
        let ids: Vec<String> = self
            .records
            .list_failed(self.config.retry_limit)
            .await?
            .into_iter()
            .map(|record| record.external_id)
            .filter(|id| wanted.as_ref().map_or(true, |w| w.contains(id)))
            .collect();

        if ids.is_empty() {
            info!("No failed devices to retry");
            return Ok(SyncRunResult::empty(RunMode::Manual));
        }

        info!(devices = ids.len(), "Retrying failed devices");
        self.run_manual(&ids).await
    }

    /// Current status snapshot.
    pub async fn sync_status(&self) -> SyncResult<SyncStatusReport> {
        let running = self.is_running();
        let last_full_sync = self.ledger.watermark(RunMode::Full).await?;
        let last_incremental_sync = self.ledger.watermark(RunMode::Incremental).await?;
        let last_run = self.ledger.latest_run().await?.map(|run| LastRun {
            state: RunState::classify(run.status, running),
            run,
        });
        let records = self.records.statistics().await?;

        Ok(SyncStatusReport {
            running,
            last_full_sync,
            last_incremental_sync,
            last_run,
            success_rate: records.success_rate(),
            records,
        })
    }

    pub async fn failed_devices(&self, limit: u32) -> SyncResult<Vec<SyncRecord>> {
        self.records.list_failed(limit).await
    }

    /// Runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> SyncResult<Vec<SyncRun>> {
        self.ledger.recent_runs(limit).await
    }

    /// Delete successful records and finished runs older than `retention_days`.
    pub async fn cleanup(&self, retention_days: u32) -> SyncResult<u64> {
        if retention_days == 0 {
            return Err(SyncError::Configuration(
                "retention must be at least one day".to_string(),
            ));
        }
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.records.cleanup(cutoff).await
    }

    /// Release remote sessions held by the target connector.
    pub async fn close(&self) {
        if let Err(e) = self.target.close().await {
            warn!(target = %self.target.display_name(), error = %e, "Failed to close target session");
        }
    }

    async fn execute(&self, mode: RunMode, selection: Selection) -> SyncResult<SyncRunResult> {
        let _guard = RunGuard::acquire(&self.running).ok_or(SyncError::ConcurrentRun)?;
        self.cancel_requested.store(false, Ordering::Release);

        let clock = Instant::now();
        let run = self.ledger.start_run(mode, Utc::now()).await?;

        info!(run_id = %run.id, mode = %mode, "Started sync run");

        let mut stats = RunStatistics::new();
        let outcome = self.drive(&selection, &mut stats).await;

        let completed_at = Utc::now();
        let counts = stats.counts();
        let (status, error_message) = match &outcome {
            Ok(()) if counts.failed == 0 => (RunStatus::Success, None),
            Ok(()) => (RunStatus::Failed, None),
            Err(e) => (RunStatus::Failed, Some(truncate(&e.to_string()))),
        };

        let finished = self
            .ledger
            .finish_run(
                run.id,
                &FinalizeSyncRun {
                    status,
                    counts,
                    duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
                    errors: stats.into_errors(),
                    error_message,
                    completed_at,
                },
            )
            .await?;

        match outcome {
            Ok(()) => {
                if status == RunStatus::Success && mode.has_watermark() {
                    self.ledger.set_watermark(mode, completed_at).await?;
                }

                info!(
                    run_id = %run.id,
                    mode = %mode,
                    status = %status,
                    processed = counts.processed,
                    created = counts.created,
                    updated = counts.updated,
                    failed = counts.failed,
                    skipped = counts.skipped,
                    duration_ms = finished.duration_ms.unwrap_or(0),
                    "Completed sync run"
                );
                Ok(SyncRunResult::from_run(&finished))
            }
            Err(e) => {
                error!(
                    run_id = %run.id,
                    mode = %mode,
                    code = e.error_code(),
                    error = %e,
                    processed = counts.processed,
                    "Sync run aborted"
                );
                Err(e)
            }
        }
    }

    async fn drive(&self, selection: &Selection, stats: &mut RunStatistics) -> SyncResult<()> {
        self.test_connection().await?;

        match selection {
            Selection::Ids(ids) => {
                let devices = self.fetch_by_ids(ids).await?;
                let batch_size = self.batch_size();
                for (index, batch) in devices.chunks(batch_size).enumerate() {
                    if index > 0 {
                        self.pause_between_batches().await;
                    }
                    self.ensure_not_cancelled()?;
                    self.process_batch(batch, stats).await?;
                }
                Ok(())
            }
            Selection::All => self.sync_pages(None, stats).await,
            Selection::ModifiedSinceWatermark => {
                let since = self.incremental_since().await?;
                if since.is_none() {
                    info!("No previous successful run, incremental sync fetches every device");
                }
                self.sync_pages(since, stats).await
            }
        }
    }

    /// Page through the source; each page is one batch.
    async fn sync_pages(
        &self,
        since: Option<DateTime<Utc>>,
        stats: &mut RunStatistics,
    ) -> SyncResult<()> {
        let limit = self.config.batch_size;
        let mut offset: u32 = 0;

        loop {
            self.ensure_not_cancelled()?;

            let page = self
                .source
                .list_devices(since, limit, offset)
                .await
                .map_err(|e| SyncError::fetch(self.source.display_name(), &e))?;
            if page.is_end() {
                break;
            }

            let fetched = page.fetched;
            let skipped = page.skipped();
            if skipped > 0 {
                warn!(offset, fetched, skipped, "Page contained unparseable devices");
            }
            debug!(offset, fetched, "Fetched device page");
            offset = offset.saturating_add(fetched);

            self.process_batch(&page.devices, stats).await?;

            if fetched >= limit {
                self.pause_between_batches().await;
            }
        }

        Ok(())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> SyncResult<Vec<SourceDevice>> {
        let mut devices = Vec::with_capacity(ids.len());

        for id in ids {
            match self.source.get_device(id).await {
                Ok(Some(device)) => devices.push(device),
                Ok(None) => warn!(external_id = %id, "Device not found in source, skipping"),
                Err(e) if e.is_not_found() => {
                    warn!(external_id = %id, "Device not found in source, skipping");
                }
                Err(e) => return Err(SyncError::fetch(self.source.display_name(), &e)),
            }
        }

        Ok(devices)
    }

    async fn incremental_since(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let watermark = match self.ledger.watermark(RunMode::Incremental).await? {
            Some(at) => Some(at),
            None => self.ledger.watermark(RunMode::Full).await?,
        };
        Ok(watermark.map(|at| at - self.config.incremental_buffer()))
    }

    /// Devices of one batch are processed sequentially.
    async fn process_batch(
        &self,
        batch: &[SourceDevice],
        stats: &mut RunStatistics,
    ) -> SyncResult<()> {
        for device in batch {
            stats.record_seen();
            match self.sync_device(device, stats).await? {
                DeviceOutcome::Skipped => stats.record_skipped(),
                DeviceOutcome::Created => stats.record_created(),
                DeviceOutcome::Updated => stats.record_updated(),
                DeviceOutcome::Failed => {}
            }
        }
        Ok(())
    }

    /// Sync one device. Only storage errors and rejected target credentials
    /// escape; every other failure is recorded against the device.
    async fn sync_device(
        &self,
        device: &SourceDevice,
        stats: &mut RunStatistics,
    ) -> SyncResult<DeviceOutcome> {
        let external_id = device.external_id.as_str();
        let fingerprint = fingerprint(device);
        let existing = self.records.get(external_id).await?;

        if let Some(record) = &existing {
            if record.status == SyncStatus::Success
                && fingerprint.matches(record.last_fingerprint.as_deref())
            {
                debug!(external_id, "Device unchanged, skipping");
                return Ok(DeviceOutcome::Skipped);
            }
        }

        let known_id = existing.as_ref().and_then(|record| record.target_id);

        self.limiter.acquire().await;
        match self.target.upsert_device(known_id, device).await {
            Ok(target_id) => {
                self.limiter.report_success();
                self.records
                    .upsert(
                        external_id,
                        Some(target_id),
                        &fingerprint,
                        SyncStatus::Success,
                        None,
                    )
                    .await?;

                debug!(external_id, target_id, created = known_id.is_none(), "Device synced");
                Ok(if known_id.is_some() {
                    DeviceOutcome::Updated
                } else {
                    DeviceOutcome::Created
                })
            }
            Err(e) => {
                self.limiter.report_error();
                let failure = SyncError::device(external_id, &e);

                warn!(
                    external_id,
                    code = e.error_code(),
                    error = %e,
                    "Device sync failed"
                );

                self.records
                    .upsert(
                        external_id,
                        known_id,
                        &fingerprint,
                        SyncStatus::Failed,
                        Some(&truncate(&e.to_string())),
                    )
                    .await?;
                stats.record_failed(&failure.to_string());

                if e.is_authentication() {
                    return Err(SyncError::Authentication {
                        system: self.target.display_name().to_string(),
                    });
                }
                Ok(DeviceOutcome::Failed)
            }
        }
    }

    fn ensure_not_cancelled(&self) -> SyncResult<()> {
        if self.cancel_requested.swap(false, Ordering::AcqRel) {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    async fn pause_between_batches(&self) {
        let pause = self.config.batch_pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    fn batch_size(&self) -> usize {
        usize::try_from(self.config.batch_size).unwrap_or(usize::MAX)
    }
}

/// Trim, drop blanks and duplicates, keep order.
fn normalize_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ids() {
        let ids = vec![
            " a ".to_string(),
            "b".to_string(),
            "a".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(normalize_ids(&ids), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_run_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = RunGuard::acquire(&flag).unwrap();
        assert!(RunGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(RunGuard::acquire(&flag).is_some());
    }
}
