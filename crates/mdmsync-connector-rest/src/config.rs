//! Connector configuration
//!
//! Typed settings for the MDM and GLPI connectors. Secrets are redacted from
//! `Debug` output.

use serde::{Deserialize, Serialize};
use url::Url;

use mdmsync_connector::error::{ConnectorError, ConnectorResult};

use crate::retry::RetryConfig;

/// Minimum accepted length for API keys and tokens.
pub const MIN_SECRET_LEN: usize = 10;

const REDACTED: &str = "***";

/// ManageEngine MDM connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Server root, e.g. `https://mdm.example.com`.
    pub base_url: String,

    /// OAuth token sent as `Zoho-oauthtoken`.
    pub api_key: String,

    /// Device collection path below `base_url`.
    #[serde(default = "default_devices_path")]
    pub devices_path: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Outbound requests per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_devices_path() -> String {
    "/api/v1/mdm/devices".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rate_limit() -> u32 {
    100
}

fn default_verify_ssl() -> bool {
    true
}

impl std::fmt::Debug for MdmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &REDACTED)
            .field("devices_path", &self.devices_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl MdmConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            devices_path: default_devices_path(),
            timeout_secs: default_timeout_secs(),
            rate_limit_per_minute: default_rate_limit(),
            verify_ssl: default_verify_ssl(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_devices_path(mut self, path: impl Into<String>) -> Self {
        self.devices_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    #[must_use]
    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] on a malformed URL,
    /// a short API key or a zero timeout.
    pub fn validate(&self) -> ConnectorResult<()> {
        validate_base_url("MDM base_url", &self.base_url)?;
        validate_secret("MDM api_key", &self.api_key)?;
        validate_timeout("MDM timeout_secs", self.timeout_secs)?;
        if self.rate_limit_per_minute == 0 {
            return Err(invalid("MDM rate_limit_per_minute must be at least 1"));
        }
        Ok(())
    }
}

/// GLPI REST API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GlpiConfig {
    /// `apirest.php` root, e.g. `https://glpi.example.com/apirest.php`.
    pub base_url: String,

    /// Application token (`App-Token` header).
    pub app_token: String,

    /// User API token used to open sessions.
    pub user_token: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl std::fmt::Debug for GlpiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlpiConfig")
            .field("base_url", &self.base_url)
            .field("app_token", &REDACTED)
            .field("user_token", &REDACTED)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl GlpiConfig {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        app_token: impl Into<String>,
        user_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_token: app_token.into(),
            user_token: user_token.into(),
            timeout_secs: default_timeout_secs(),
            rate_limit_per_minute: default_rate_limit(),
            verify_ssl: default_verify_ssl(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    #[must_use]
    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] on a malformed URL,
    /// short tokens or a zero timeout.
    pub fn validate(&self) -> ConnectorResult<()> {
        validate_base_url("GLPI base_url", &self.base_url)?;
        validate_secret("GLPI app_token", &self.app_token)?;
        validate_secret("GLPI user_token", &self.user_token)?;
        validate_timeout("GLPI timeout_secs", self.timeout_secs)?;
        if self.rate_limit_per_minute == 0 {
            return Err(invalid("GLPI rate_limit_per_minute must be at least 1"));
        }
        Ok(())
    }
}

/// Require an absolute `http`/`https` URL with a host.
///
/// # Errors
///
/// Returns [`ConnectorError::InvalidConfiguration`] naming `what`.
pub fn validate_base_url(what: &str, value: &str) -> ConnectorResult<Url> {
    let url = Url::parse(value).map_err(|e| invalid(format!("{what} is not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(invalid(format!(
                "{what} must use http or https, got {other}"
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(invalid(format!("{what} has no host")));
    }
    Ok(url)
}

fn validate_secret(what: &str, value: &str) -> ConnectorResult<()> {
    if value.trim().len() < MIN_SECRET_LEN {
        return Err(invalid(format!(
            "{what} must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_timeout(what: &str, secs: u64) -> ConnectorResult<()> {
    if secs == 0 {
        return Err(invalid(format!("{what} must be greater than zero")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConnectorError {
    ConnectorError::InvalidConfiguration {
        message: message.into(),
    }
}
