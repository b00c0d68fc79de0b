//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and every value
//! is validated before a connection is opened. A `.env` file in the working
//! directory is read first when present.

use std::env;
use std::fmt::Display;
use std::num::ParseIntError;
use std::ops::RangeInclusive;
use std::str::FromStr;

use mdmsync_connector::ConnectorError;
use mdmsync_connector_rest::{GlpiConfig, MdmConfig, RetryConfig};
use mdmsync_sync::{HealthConfig, ScheduleConfig, SyncConfig, SyncError};
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/mdmsync.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

const DATABASE_CONNECTIONS: RangeInclusive<u32> = 1..=50;
const HEALTH_TIMEOUT_SECS: RangeInclusive<u64> = 1..=300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse {var}: {source}")]
    InvalidNumber {
        var: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{0}")]
    Connector(#[from] ConnectorError),

    #[error("{0}")]
    Sync(#[from] SyncError),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(format!("expected json or text, got '{other}'")),
        }
    }
}

impl LogFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mdm: MdmConfig,
    pub glpi: GlpiConfig,
    pub sync: SyncConfig,
    pub schedule: ScheduleConfig,
    pub health: HealthConfig,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load through `lookup`, which returns the raw value of a variable.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let sync = SyncConfig {
            batch_size: vars.number("SYNC_BATCH_SIZE", SyncConfig::default().batch_size)?,
            max_retries: vars.number("SYNC_MAX_RETRIES", SyncConfig::default().max_retries)?,
            batch_pause_ms: vars.number("SYNC_BATCH_PAUSE_MS", SyncConfig::default().batch_pause_ms)?,
            incremental_buffer_secs: vars.number(
                "SYNC_INCREMENTAL_BUFFER_SECS",
                SyncConfig::default().incremental_buffer_secs,
            )?,
            rate_limit: vars.number("SYNC_RATE_LIMIT", SyncConfig::default().rate_limit)?,
            rate_window_secs: vars
                .number("SYNC_RATE_WINDOW_SECS", SyncConfig::default().rate_window_secs)?,
            retry_limit: vars.number("SYNC_RETRY_LIMIT", SyncConfig::default().retry_limit)?,
        };
        sync.validate()?;

        let retry = RetryConfig::new(sync.max_retries);

        let mut mdm = MdmConfig::new(vars.required("MDM_BASE_URL")?, vars.required("MDM_API_KEY")?)
            .with_timeout(vars.number("MDM_TIMEOUT_SECS", 30)?)
            .with_rate_limit(vars.number("MDM_RATE_LIMIT", 100)?)
            .with_verify_ssl(vars.flag("MDM_VERIFY_SSL", true)?)
            .with_retry(retry.clone());
        if let Some(path) = vars.get("MDM_DEVICES_PATH") {
            mdm = mdm.with_devices_path(path);
        }
        mdm.validate()?;

        let glpi = GlpiConfig::new(
            vars.required("GLPI_BASE_URL")?,
            vars.required("GLPI_APP_TOKEN")?,
            vars.required("GLPI_USER_TOKEN")?,
        )
        .with_timeout(vars.number("GLPI_TIMEOUT_SECS", 30)?)
        .with_rate_limit(vars.number("GLPI_RATE_LIMIT", 100)?)
        .with_verify_ssl(vars.flag("GLPI_VERIFY_SSL", true)?)
        .with_retry(retry);
        glpi.validate()?;

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            full_interval_secs: vars.number("SYNC_FULL_INTERVAL_SECS", defaults.full_interval_secs)?,
            incremental_interval_secs: vars.number(
                "SYNC_INCREMENTAL_INTERVAL_SECS",
                defaults.incremental_interval_secs,
            )?,
            cleanup_interval_secs: vars
                .number("SYNC_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs)?,
            retention_days: vars.number("SYNC_RETENTION_DAYS", defaults.retention_days)?,
            run_initial: vars.flag("SYNC_RUN_INITIAL", defaults.run_initial)?,
        };
        schedule.validate()?;

        let health = HealthConfig {
            check_timeout_secs: vars.bounded(
                "HEALTH_TIMEOUT_SECS",
                HealthConfig::default().check_timeout_secs,
                HEALTH_TIMEOUT_SECS,
            )?,
        };

        let log_format = match vars.get("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                var: "LOG_FORMAT".to_string(),
                message,
            })?,
        };

        Ok(Self {
            mdm,
            glpi,
            sync,
            schedule,
            health,
            database_url: vars
                .get("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: vars.bounded(
                "DATABASE_MAX_CONNECTIONS",
                mdmsync_db::DEFAULT_MAX_CONNECTIONS,
                DATABASE_CONNECTIONS,
            )?,
            log_format,
            log_filter: vars
                .get("RUST_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &str) -> Result<String, ConfigError> {
        self.get(var)
            .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
    }

    fn number<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr<Err = ParseIntError>,
    {
        match self.get(var) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|source| ConfigError::InvalidNumber {
                var: var.to_string(),
                source,
            }),
        }
    }

    fn bounded<T>(&self, var: &str, default: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
    where
        T: FromStr<Err = ParseIntError> + PartialOrd + Display,
    {
        let value = self.number(var, default)?;
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(ConfigError::InvalidValue {
                var: var.to_string(),
                message: format!(
                    "must be between {} and {}, got {value}",
                    range.start(),
                    range.end()
                ),
            })
        }
    }

    fn flag(&self, var: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(var) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                message: format!("expected true or false, got '{raw}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("MDM_BASE_URL", "https://mdm.example.com".to_string()),
            ("MDM_API_KEY", "mdm-api-key-0123456789".to_string()),
            ("GLPI_BASE_URL", "https://glpi.example.com/apirest.php".to_string()),
            ("GLPI_APP_TOKEN", "glpi-app-token-0123".to_string()),
            ("GLPI_USER_TOKEN", "glpi-user-token-0123".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.health.check_timeout_secs, 30);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.mdm.timeout_secs, 30);
        assert_eq!(config.glpi.rate_limit_per_minute, 100);
        assert!(config.mdm.verify_ssl);
        assert_eq!(config.mdm.retry.max_retries, 3);
    }

    #[test]
    fn test_missing_required_var() {
        let mut env = base_env();
        env.remove("GLPI_USER_TOKEN");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "GLPI_USER_TOKEN"));
    }

    #[test]
    fn test_blank_var_counts_as_missing() {
        let mut env = base_env();
        env.insert("MDM_API_KEY", "   ".to_string());
        assert!(matches!(load(&env), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert("SYNC_BATCH_SIZE", "250".to_string());
        env.insert("SYNC_MAX_RETRIES", "0".to_string());
        env.insert("SYNC_RUN_INITIAL", "yes".to_string());
        env.insert("MDM_VERIFY_SSL", "false".to_string());
        env.insert("MDM_DEVICES_PATH", "/api/v1/devices".to_string());
        env.insert("DATABASE_URL", "sqlite::memory:".to_string());
        env.insert("LOG_FORMAT", "text".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.sync.batch_size, 250);
        assert_eq!(config.glpi.retry.max_retries, 0);
        assert!(config.schedule.run_initial);
        assert!(!config.mdm.verify_ssl);
        assert_eq!(config.mdm.devices_path, "/api/v1/devices");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_batch_size_out_of_range() {
        let mut env = base_env();
        env.insert("SYNC_BATCH_SIZE", "5000".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Sync(_))));
    }

    #[test]
    fn test_huge_incremental_buffer_is_rejected() {
        let mut env = base_env();
        env.insert("SYNC_INCREMENTAL_BUFFER_SECS", "5000000000000000".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Sync(_))));
    }

    #[test]
    fn test_unparsable_number() {
        let mut env = base_env();
        env.insert("SYNC_RATE_LIMIT", "fast".to_string());
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { ref var, .. } if var == "SYNC_RATE_LIMIT"));
    }

    #[test]
    fn test_bounded_values() {
        let mut env = base_env();
        env.insert("DATABASE_MAX_CONNECTIONS", "51".to_string());
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("HEALTH_TIMEOUT_SECS", "0".to_string());
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_url_and_short_token() {
        let mut env = base_env();
        env.insert("MDM_BASE_URL", "ftp://mdm.example.com".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Connector(_))));

        let mut env = base_env();
        env.insert("GLPI_APP_TOKEN", "short".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Connector(_))));
    }

    #[test]
    fn test_invalid_flag_and_log_format() {
        let mut env = base_env();
        env.insert("GLPI_VERIFY_SSL", "maybe".to_string());
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("LOG_FORMAT", "xml".to_string());
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { ref var, .. }) if var == "LOG_FORMAT"));
    }
}
