//! CLI error types and exit codes

use mdmsync_connector::ConnectorError;
use mdmsync_db::DbError;
use mdmsync_sync::SyncError;
use thiserror::Error;

use crate::config::ConfigError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: Run failed or finished with failed devices
/// - 2: Configuration error
/// - 3: Another run is in progress
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Another sync run is already in progress")]
    ConcurrentRun,

    #[error("Sync failed: {0}")]
    Sync(SyncError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Sync finished with {failed} failed device(s)")]
    DevicesFailed { failed: u64 },

    #[error("Health check reported {0}")]
    Unhealthy(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::ConcurrentRun => CliError::ConcurrentRun,
            SyncError::Storage(db) => CliError::Database(db),
            other => CliError::Sync(other),
        }
    }
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Validation(_) => 2,
            CliError::Sync(SyncError::Configuration(_)) => 2,
            CliError::Connector(ConnectorError::InvalidConfiguration { .. }) => 2,
            CliError::ConcurrentRun => 3,
            CliError::Sync(_)
            | CliError::Connector(_)
            | CliError::Database(_)
            | CliError::DevicesFailed { .. }
            | CliError::Unhealthy(_)
            | CliError::Output(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => {
                Some("Check the MDM_*, GLPI_* and SYNC_* environment variables or your .env file.")
            }
            CliError::ConcurrentRun => {
                Some("Wait for the active run to finish, or run 'mdmsync status' to see it.")
            }
            CliError::DevicesFailed { .. } => {
                Some("Run 'mdmsync failed' to list them and 'mdmsync retry' to try again.")
            }
            CliError::Sync(SyncError::Authentication { .. }) => {
                Some("Check MDM_API_KEY, GLPI_APP_TOKEN and GLPI_USER_TOKEN.")
            }
            CliError::Sync(SyncError::Connectivity { .. }) | CliError::Unhealthy(_) => {
                Some("Run 'mdmsync health' to see which system is unreachable.")
            }
            _ => None,
        }
    }
}
