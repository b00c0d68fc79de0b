//! Run counters and the summary returned to callers.

use std::time::Duration;

use mdmsync_db::{RunCounts, RunMode, SyncRun};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::truncate;

/// Error messages kept verbatim per run. Further failures are only counted.
pub const MAX_RUN_ERRORS: usize = 10;

/// Counters accumulated while a run executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    counts: RunCounts,
    errors: Vec<String>,
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A device was seen, whatever its outcome.
    pub fn record_seen(&mut self) {
        self.counts.processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.counts.skipped += 1;
    }

    pub fn record_created(&mut self) {
        self.counts.created += 1;
    }

    pub fn record_updated(&mut self) {
        self.counts.updated += 1;
    }

    pub fn record_failed(&mut self, message: &str) {
        self.counts.failed += 1;
        if self.errors.len() < MAX_RUN_ERRORS {
            self.errors.push(truncate(message));
        }
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunResult {
    /// Ledger entry, `None` when nothing needed a run.
    pub run_id: Option<Uuid>,
    pub mode: RunMode,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    /// No device failed and no run-fatal error occurred.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncRunResult {
    /// Result of a request that selected no devices.
    #[must_use]
    pub fn empty(mode: RunMode) -> Self {
        Self {
            run_id: None,
            mode,
            processed: 0,
            created: 0,
            updated: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            duration_ms: 0,
            success: true,
            error_message: None,
        }
    }

    /// Build the summary from a finalized ledger entry.
    #[must_use]
    pub fn from_run(run: &SyncRun) -> Self {
        Self {
            run_id: Some(run.id),
            mode: run.mode,
            processed: run.counts.processed,
            created: run.counts.created,
            updated: run.counts.updated,
            failed: run.counts.failed,
            skipped: run.counts.skipped,
            errors: run.errors.clone(),
            duration_ms: run.duration_ms.unwrap_or(0),
            success: run.status == mdmsync_db::RunStatus::Success,
            error_message: run.error_message.clone(),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            processed: self.processed,
            created: self.created,
            updated: self.updated,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}
