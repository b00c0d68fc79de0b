//! Operator-facing status snapshot.

use chrono::{DateTime, Utc};
use mdmsync_db::{RecordStatistics, RunStatus, SyncRun};
use serde::{Deserialize, Serialize};

/// State of the latest run as seen from this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    InProgress,
    Success,
    Failed,
    /// Recorded as in progress but no run is active in this process.
    /// The process that started it most likely died.
    Stale,
}

impl RunState {
    #[must_use]
    pub fn classify(status: RunStatus, running_here: bool) -> Self {
        match status {
            RunStatus::InProgress if running_here => RunState::InProgress,
            RunStatus::InProgress => RunState::Stale,
            RunStatus::Success => RunState::Success,
            RunStatus::Failed => RunState::Failed,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::InProgress => "in_progress",
            RunState::Success => "success",
            RunState::Failed => "failed",
            RunState::Stale => "stale",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub state: RunState,
    #[serde(flatten)]
    pub run: SyncRun,
}

/// Snapshot returned by `ReconciliationEngine::sync_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusReport {
    pub running: bool,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub last_incremental_sync: Option<DateTime<Utc>>,
    pub last_run: Option<LastRun>,
    pub records: RecordStatistics,
    /// Percentage of records in success state.
    pub success_rate: f64,
}
