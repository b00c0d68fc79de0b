//! # Device Reconciliation
//!
//! One-way reconciliation of MDM devices into GLPI: the MDM is
//! authoritative, every run pushes new or changed devices to the target and
//! records the outcome per device.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ReconciliationEngine                       │
//! │                                                                 │
//! │  run_full / run_incremental / run_manual / retry_failed         │
//! │        │                                                        │
//! │        ▼                                                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ Source pages │──▶│ Fingerprint  │──▶│ skip or upsert      │  │
//! │  │ / ids        │   │ vs record    │   │ (rate limited)      │  │
//! │  └──────────────┘   └──────────────┘   └─────────────────────┘  │
//! │                                                  │              │
//! │                                                  ▼              │
//! │                       DeviceRecordStore + RunLedger (SQLite)    │
//! └─────────────────────────────────────────────────────────────────┘
//!          ▲                                   ▲
//!          │                                   │
//!    SyncScheduler                       HealthChecker
//! ```
//!
//! ## Run lifecycle
//!
//! 1. Only one run at a time per engine; a second caller gets
//!    [`SyncError::ConcurrentRun`] and no ledger entry is written.
//! 2. A ledger entry is opened, then both systems are checked.
//! 3. Devices are processed batch by batch. Unchanged devices are skipped
//!    without any target call.
//! 4. The entry is finalized with counters and the first error messages.
//!    Full and incremental watermarks only move after a clean run.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mdmsync_sync::{ReconciliationEngine, SqliteStore, SyncConfig};
//!
//! let store = Arc::new(SqliteStore::new(pool));
//! let engine = ReconciliationEngine::new(
//!     source,
//!     target,
//!     store.clone(),
//!     store,
//!     SyncConfig::default(),
//! )?;
//!
//! let result = engine.run_incremental().await?;
//! println!("{} created, {} updated", result.created, result.updated);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod health;
pub mod scheduler;
pub mod statistics;
pub mod status;
pub mod store;

pub use config::SyncConfig;
pub use engine::ReconciliationEngine;
pub use error::{SyncError, SyncResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use health::{ComponentHealth, HealthChecker, HealthConfig, HealthReport, HealthStatus};
pub use scheduler::{ScheduleConfig, ScheduledJob, SyncScheduler};
pub use statistics::{RunStatistics, SyncRunResult, MAX_RUN_ERRORS};
pub use status::{LastRun, RunState, SyncStatusReport};
pub use store::{DeviceRecordStore, RunLedger, SqliteStore};

pub use mdmsync_db::{RunMode, RunStatus, SyncRecord, SyncRun, SyncStatus};
