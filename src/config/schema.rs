//! Server settings schema.
//!
//! Every section has serde defaults, so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::environment::loader::{DEFAULT_ENVIRONMENTS_FILE, DEFAULT_LEGACY_FILE};

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub environments: EnvironmentFiles,
    pub watch: WatchSettings,
    pub databricks: DatabricksSettings,
}

/// Server section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

/// Log output format. Output always goes to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!(
                "unknown log format '{other}' (expected pretty, compact or json)"
            )),
        }
    }
}

/// Locations of the environment configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentFiles {
    pub file: PathBuf,
    pub legacy_file: PathBuf,
}

impl Default for EnvironmentFiles {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_ENVIRONMENTS_FILE),
            legacy_file: PathBuf::from(DEFAULT_LEGACY_FILE),
        }
    }
}

/// Hot reload section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            poll_interval_ms: 2000,
        }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Databricks client section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabricksSettings {
    /// Databricks CLI used to mint tokens for profile-based environments
    pub cli_path: PathBuf,
    pub auth_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for DatabricksSettings {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from("databricks"),
            auth_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl DatabricksSettings {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
