//! Periodic full, incremental and cleanup runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::engine::ReconciliationEngine;
use crate::error::{SyncError, SyncResult};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_full_interval_secs")]
    pub full_interval_secs: u64,
    #[serde(default = "default_incremental_interval_secs")]
    pub incremental_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Age after which successful records and finished runs are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Run a full sync right after start.
    #[serde(default)]
    pub run_initial: bool,
}

fn default_full_interval_secs() -> u64 {
    24 * 3600
}

fn default_incremental_interval_secs() -> u64 {
    15 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    24 * 3600
}

fn default_retention_days() -> u32 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            full_interval_secs: default_full_interval_secs(),
            incremental_interval_secs: default_incremental_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_days: default_retention_days(),
            run_initial: false,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> SyncResult<()> {
        for (name, secs) in [
            ("full_interval_secs", self.full_interval_secs),
            ("incremental_interval_secs", self.incremental_interval_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
        ] {
            if secs == 0 {
                return Err(SyncError::Configuration(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if self.retention_days == 0 {
            return Err(SyncError::Configuration(
                "retention_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Jobs run by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledJob {
    FullSync,
    IncrementalSync,
    Cleanup,
}

impl std::fmt::Display for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullSync => write!(f, "full_sync"),
            Self::IncrementalSync => write!(f, "incremental_sync"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Drives the engine on fixed intervals until shut down.
pub struct SyncScheduler {
    engine: Arc<ReconciliationEngine>,
    config: ScheduleConfig,
    shutdown: AtomicBool,
    wake: Notify,
}

impl SyncScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, config: ScheduleConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            full_interval_secs = self.config.full_interval_secs,
            incremental_interval_secs = self.config.incremental_interval_secs,
            cleanup_interval_secs = self.config.cleanup_interval_secs,
            "Starting sync scheduler"
        );

        if self.config.run_initial && !self.is_shutdown() {
            self.run_job(ScheduledJob::FullSync).await;
        }

        let mut full = Self::ticker(self.config.full_interval_secs);
        let mut incremental = Self::ticker(self.config.incremental_interval_secs);
        let mut cleanup = Self::ticker(self.config.cleanup_interval_secs);

        while !self.is_shutdown() {
            let job = tokio::select! {
                () = self.wake.notified() => continue,
                _ = full.tick() => ScheduledJob::FullSync,
                _ = incremental.tick() => ScheduledJob::IncrementalSync,
                _ = cleanup.tick() => ScheduledJob::Cleanup,
            };
            if self.is_shutdown() {
                break;
            }
            self.run_job(job).await;
        }

        info!("Sync scheduler stopped");
    }

    /// Stop the loop and cancel the active run at its next batch boundary.
    pub fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.shutdown.store(true, Ordering::Release);
        self.engine.cancel();
        self.wake.notify_one();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// First tick one period from now; missed ticks are dropped.
    fn ticker(secs: u64) -> tokio::time::Interval {
        let period = Duration::from_secs(secs);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    async fn run_job(&self, job: ScheduledJob) {
        let outcome = match job {
            ScheduledJob::FullSync => self.engine.run_full().await.map(|r| r.success),
            ScheduledJob::IncrementalSync => self.engine.run_incremental().await.map(|r| r.success),
            ScheduledJob::Cleanup => self
                .engine
                .cleanup(self.config.retention_days)
                .await
                .map(|deleted| {
                    info!(deleted, "Scheduled cleanup finished");
                    true
                }),
        };

        match outcome {
            Ok(true) => info!(job = %job, "Scheduled job finished"),
            Ok(false) => warn!(job = %job, "Scheduled job finished with device failures"),
            Err(SyncError::ConcurrentRun) => {
                info!(job = %job, "Another run is active, skipping this tick");
            }
            Err(SyncError::Cancelled) => info!(job = %job, "Scheduled job cancelled"),
            Err(e) => error!(job = %job, code = e.error_code(), error = %e, "Scheduled job failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let config = ScheduleConfig::default();
        assert_eq!(config.full_interval_secs, 86_400);
        assert_eq!(config.incremental_interval_secs, 900);
        assert_eq!(config.retention_days, 30);
        assert!(!config.run_initial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ScheduleConfig {
            incremental_interval_secs: 0,
            ..ScheduleConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_display() {
        assert_eq!(ScheduledJob::IncrementalSync.to_string(), "incremental_sync");
    }
}
