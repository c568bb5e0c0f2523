//! Tool-facing error type.
//!
//! Every failure an MCP tool can report is an `AppError`; the MCP layer turns it into
//! a `CallToolError` so the client sees the message and the server keeps running.

use crate::environment::{ReloadError, SwitchError};
use crate::service::WorkspaceError;
use thiserror::Error;

/// A specialized `Result` type for tool operations.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error("reload rejected, keeping current configuration: {0}")]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("failed to serialize tool output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ValidationError;

    #[test]
    fn switch_error_passes_through() {
        let err: AppError = SwitchError::UnknownEnvironment {
            requested: "qa".to_string(),
            available: vec!["dev".to_string()],
        }
        .into();
        assert_eq!(
            err.to_string(),
            "environment 'qa' not found. Available environments: dev"
        );
    }

    #[test]
    fn reload_error_says_configuration_kept() {
        let err: AppError = ReloadError::from(ValidationError::NoEnvironments).into();
        assert_eq!(
            err.to_string(),
            "reload rejected, keeping current configuration: configuration defines no environments"
        );
    }

    #[test]
    fn invalid_argument_names_parameter() {
        let err = AppError::invalid_argument("cluster_id", "must not be empty");
        assert_eq!(err.to_string(), "invalid argument 'cluster_id': must not be empty");
    }
}
