//! Sync error taxonomy.
//!
//! Run-fatal errors abort a whole run and are returned to the caller.
//! Device-local errors are recorded against the device and aggregated
//! into the run summary; they never escape the per-device handler.

use mdmsync_connector::ConnectorError;
use mdmsync_db::DbError;
use thiserror::Error;

/// Longest error text kept per device or per run summary entry.
pub const MAX_ERROR_LEN: usize = 500;

/// Errors produced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Source or target unreachable.
    #[error("{system} is unreachable: {message}")]
    Connectivity { system: String, message: String },

    /// Credentials rejected by a remote system.
    #[error("{system} rejected the configured credentials")]
    Authentication { system: String },

    /// Another run is active in this process.
    #[error("a sync run is already in progress")]
    ConcurrentRun,

    /// Single-device upsert failure.
    #[error("Device {external_id}: {message}")]
    DeviceSync {
        external_id: String,
        message: String,
    },

    /// Target throttled a single device call.
    #[error("Device {external_id}: rate limit exceeded{}", retry_hint(*.retry_after_secs))]
    RateLimitExceeded {
        external_id: String,
        retry_after_secs: Option<u64>,
    },

    /// Listing or fetching devices from the source failed.
    #[error("failed to fetch devices from {system}: {message}")]
    Fetch { system: String, message: String },

    /// The run was asked to stop at a batch boundary.
    #[error("run cancelled")]
    Cancelled,

    /// Invalid engine or scheduler configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

fn retry_hint(retry_after_secs: Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

impl SyncError {
    /// Map a failed connection test. Rejected credentials stay distinct.
    pub fn unreachable(system: &str, error: &ConnectorError) -> Self {
        if error.is_authentication() {
            SyncError::Authentication {
                system: system.to_string(),
            }
        } else {
            SyncError::Connectivity {
                system: system.to_string(),
                message: truncate(&error.to_string()),
            }
        }
    }

    /// Map a failed device listing or single-device fetch.
    pub fn fetch(system: &str, error: &ConnectorError) -> Self {
        if error.is_authentication() {
            SyncError::Authentication {
                system: system.to_string(),
            }
        } else if error.is_connectivity() {
            SyncError::Connectivity {
                system: system.to_string(),
                message: truncate(&error.to_string()),
            }
        } else {
            SyncError::Fetch {
                system: system.to_string(),
                message: truncate(&error.to_string()),
            }
        }
    }

    /// Map a failed upsert of one device.
    pub fn device(external_id: &str, error: &ConnectorError) -> Self {
        match error {
            ConnectorError::RateLimited { retry_after_secs } => SyncError::RateLimitExceeded {
                external_id: external_id.to_string(),
                retry_after_secs: *retry_after_secs,
            },
            other => SyncError::DeviceSync {
                external_id: external_id.to_string(),
                message: truncate(&other.to_string()),
            },
        }
    }

    /// Whether this error aborts the whole run.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        !matches!(
            self,
            SyncError::DeviceSync { .. } | SyncError::RateLimitExceeded { .. }
        )
    }

    /// Whether trying again later may succeed without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connectivity { .. }
                | SyncError::RateLimitExceeded { .. }
                | SyncError::ConcurrentRun
                | SyncError::DeviceSync { .. }
        )
    }

    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, SyncError::Authentication { .. })
    }

    #[must_use]
    pub fn is_concurrent_run(&self) -> bool {
        matches!(self, SyncError::ConcurrentRun)
    }

    /// Stable code for logs and machine-readable output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Connectivity { .. } => "CONNECTIVITY",
            SyncError::Authentication { .. } => "AUTHENTICATION",
            SyncError::ConcurrentRun => "CONCURRENT_RUN",
            SyncError::DeviceSync { .. } => "DEVICE_SYNC",
            SyncError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            SyncError::Fetch { .. } => "FETCH_FAILED",
            SyncError::Cancelled => "CANCELLED",
            SyncError::Configuration(_) => "CONFIGURATION",
            SyncError::Storage(_) => "STORAGE",
        }
    }
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Cut `message` to [`MAX_ERROR_LEN`] characters.
#[must_use]
pub fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(MAX_ERROR_LEN).collect();
    cut.push_str("...");
    cut
}
