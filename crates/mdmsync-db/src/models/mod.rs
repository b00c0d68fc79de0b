//! Database models.

pub mod sync_record;
pub mod sync_run;
pub mod sync_state;

pub use sync_record::{RecordStatistics, SyncRecord, SyncStatus, UpsertSyncRecord};
pub use sync_run::{FinalizeSyncRun, RunCounts, RunMode, RunStatus, SyncRun};
pub use sync_state::SyncWatermark;
