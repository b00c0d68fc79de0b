//! # mdmsync-db
//!
//! SQLite persistence for the device reconciliation engine:
//!
//! - `sync_records`: per-device GLPI id, last fingerprint, status, retries
//! - `sync_runs`: audit ledger of every run
//! - `sync_state`: watermarks for incremental selection
//!
//! Models expose associated async functions taking the `SQLx` pool.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::{latest_version, run_migrations};
pub use models::*;
pub use pool::{DbPool, DEFAULT_MAX_CONNECTIONS};
