//! Settings error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading server settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file named explicitly but not found
    #[error("Settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read settings file
    #[error("Failed to read settings file '{}': {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse settings file '{}': {source}", .path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Failed to write settings file
    #[error("Failed to write settings file '{}': {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid settings value
    #[error("Invalid settings value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    /// Environment variable parse error
    #[error("Failed to parse environment variable '{var}': {message}")]
    EnvParseError { var: String, message: String },
}

impl ConfigError {
    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse<V: Into<String>, M: Into<String>>(var: V, message: M) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
