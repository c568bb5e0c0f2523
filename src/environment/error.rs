//! Error types for the environment subsystem.
//!
//! Loading, validation, switching and reloading each have their own error type so
//! callers can tell a bad file apart from a bad request. Only [`StartupError`] is
//! allowed to stop the process.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading an environments file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Neither the structured file nor the legacy file exists.
    #[error(
        "no environment configuration found: create '{}' (recommended) or the legacy '{}'",
        .structured.display(),
        .legacy.display()
    )]
    NotFound { structured: PathBuf, legacy: PathBuf },

    /// The file exists but could not be read.
    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not syntactically valid YAML/TOML.
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The file parsed, but a required field is absent, mistyped or malformed.
    #[error("invalid value for '{field}' in '{}': {message}", .path.display())]
    Schema {
        path: PathBuf,
        field: String,
        message: String,
    },

    /// Failed to serialize a configuration set.
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    /// Failed to write a configuration file.
    #[error("failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub(crate) fn schema(
        path: impl Into<PathBuf>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Schema {
            path: path.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Cross-field invariant violations. Validation stops at the first one found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("configuration defines no environments")]
    NoEnvironments,

    #[error(
        "default environment '{default}' not found. Available environments: {}",
        .available.join(", ")
    )]
    UnknownDefault {
        default: String,
        available: Vec<String>,
    },

    #[error("environment name '{name}' is invalid: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("environment key '{key}' does not match environment name '{name}'")]
    NameMismatch { key: String, name: String },

    #[error(
        "environment '{name}' has incomplete credentials, missing: {}",
        .missing.join(", ")
    )]
    IncompleteCredentials {
        name: String,
        missing: Vec<&'static str>,
    },

    #[error(
        "environment '{name}' specifies both 'token' and 'profile'; choose one authentication method"
    )]
    AmbiguousAuth { name: String },

    #[error("environment '{name}' is defined more than once")]
    DuplicateName { name: String },
}

impl ValidationError {
    /// The environment name (or `default`) the violation refers to, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::NoEnvironments => None,
            Self::UnknownDefault { default, .. } => Some(default),
            Self::InvalidName { name, .. }
            | Self::IncompleteCredentials { name, .. }
            | Self::AmbiguousAuth { name }
            | Self::DuplicateName { name } => Some(name),
            Self::NameMismatch { key, .. } => Some(key),
        }
    }
}

/// A switch request that could not be honoured. State is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error(
        "environment '{requested}' not found. Available environments: {}",
        .available.join(", ")
    )]
    UnknownEnvironment {
        requested: String,
        available: Vec<String>,
    },
}

impl SwitchError {
    pub fn requested(&self) -> &str {
        match self {
            Self::UnknownEnvironment { requested, .. } => requested,
        }
    }

    pub fn available(&self) -> &[String] {
        match self {
            Self::UnknownEnvironment { available, .. } => available,
        }
    }
}

/// A rejected reload. The previous configuration stays in effect.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ReloadError {
    /// The environment a validation failure refers to; `None` for load failures.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Load(_) => None,
            Self::Validation(err) => err.subject(),
        }
    }
}

/// The initial load failed; the server must not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot start: {0}")]
    Load(#[from] LoadError),

    #[error("cannot start: invalid environment configuration: {0}")]
    Validation(#[from] ValidationError),
}

impl From<ReloadError> for StartupError {
    fn from(err: ReloadError) -> Self {
        match err {
            ReloadError::Load(e) => Self::Load(e),
            ReloadError::Validation(e) => Self::Validation(e),
        }
    }
}
