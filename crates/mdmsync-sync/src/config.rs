//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Bounds enforced by [`SyncConfig::validate`].
pub const MAX_BATCH_SIZE: u32 = 1000;
pub const MAX_RETRIES: u32 = 10;
/// One week.
pub const MAX_INCREMENTAL_BUFFER_SECS: u64 = 7 * 86_400;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Devices fetched and processed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// HTTP retries per remote call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed pause between batches.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Subtracted from the watermark for incremental selection.
    #[serde(default = "default_incremental_buffer_secs")]
    pub incremental_buffer_secs: u64,
    /// Target upserts allowed per `rate_window_secs`.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Failed records considered by a retry.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_incremental_buffer_secs() -> u64 {
    300
}

fn default_rate_limit() -> u32 {
    30
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_retry_limit() -> u32 {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            batch_pause_ms: default_batch_pause_ms(),
            incremental_buffer_secs: default_incremental_buffer_secs(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            retry_limit: default_retry_limit(),
        }
    }
}

impl SyncConfig {
    /// Check ranges. Called by the engine constructor.
    pub fn validate(&self) -> SyncResult<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(SyncError::Configuration(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(SyncError::Configuration(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                self.max_retries
            )));
        }
        if self.incremental_buffer_secs > MAX_INCREMENTAL_BUFFER_SECS {
            return Err(SyncError::Configuration(format!(
                "incremental_buffer_secs must be at most {MAX_INCREMENTAL_BUFFER_SECS}, got {}",
                self.incremental_buffer_secs
            )));
        }
        if self.rate_limit == 0 {
            return Err(SyncError::Configuration(
                "rate_limit must be at least 1".to_string(),
            ));
        }
        if self.rate_window_secs == 0 {
            return Err(SyncError::Configuration(
                "rate_window_secs must be at least 1".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(SyncError::Configuration(
                "retry_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Clamped to [`MAX_INCREMENTAL_BUFFER_SECS`].
    #[must_use]
    pub fn incremental_buffer(&self) -> chrono::Duration {
        let secs = self.incremental_buffer_secs.min(MAX_INCREMENTAL_BUFFER_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.batch_pause(), Duration::from_secs(1));
        assert_eq!(config.incremental_buffer(), chrono::Duration::minutes(5));
        assert_eq!(config.rate_limit, 30);
        assert_eq!(config.rate_window(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"batch_size": 25}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.batch_pause_ms, 1000);
        assert_eq!(config.retry_limit, 1000);
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        config.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());

        config.batch_size = MAX_BATCH_SIZE;
        assert!(config.validate().is_ok());

        config.max_retries = 11;
        assert!(config.validate().is_err());

        config.max_retries = 0;
        config.rate_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incremental_buffer_is_bounded() {
        let mut config = SyncConfig {
            incremental_buffer_secs: MAX_INCREMENTAL_BUFFER_SECS,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_ok());

        config.incremental_buffer_secs = 5_000_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("incremental_buffer_secs"));

        assert_eq!(config.incremental_buffer(), chrono::Duration::days(7));
        let now = chrono::Utc::now();
        assert!(now - config.incremental_buffer() < now);
    }
}
