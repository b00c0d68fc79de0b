//! Connector errors.
//!
//! Every error maps to an [`ErrorKind`]; the engine decides between aborting
//! a run and recording a single failed device from the kind alone.

use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a [`ConnectorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Remote side unreachable, timing out or answering 502/503/504.
    Connectivity,
    /// 429 that outlived the retry budget.
    RateLimit,
    /// Credentials rejected or lacking a permission.
    Authentication,
    Configuration,
    NotFound,
    /// The remote side answered with something we cannot use.
    Data,
    /// Any other remote failure.
    Remote,
}

impl ErrorKind {
    /// Worth trying again later without operator action.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Connectivity | ErrorKind::RateLimit)
    }
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    #[error("remote system unavailable: {message}")]
    TargetUnavailable { message: String },

    #[error("rate limit exceeded{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    #[error("invalid data: {message}")]
    InvalidData { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

impl ConnectorError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::ConnectionFailed { .. }
            | ConnectorError::ConnectionTimeout { .. }
            | ConnectorError::TargetUnavailable { .. } => ErrorKind::Connectivity,
            ConnectorError::RateLimited { .. } => ErrorKind::RateLimit,
            ConnectorError::AuthenticationFailed | ConnectorError::AuthorizationFailed { .. } => {
                ErrorKind::Authentication
            }
            ConnectorError::InvalidConfiguration { .. } => ErrorKind::Configuration,
            ConnectorError::ObjectNotFound { .. } => ErrorKind::NotFound,
            ConnectorError::InvalidData { .. } | ConnectorError::Serialization { .. } => {
                ErrorKind::Data
            }
            ConnectorError::OperationFailed { .. } => ErrorKind::Remote,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Credentials need rotating; retrying will not help.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimit
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Stable code for structured logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::RateLimited { .. } => "RATE_LIMITED",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    pub fn not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization {
            message: err.to_string(),
        }
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}
