//! Server settings for databricks-mcp.
//!
//! TOML settings with environment variable overrides. These control how the server
//! runs (log output, file locations, hot reload, Databricks client timeouts); the
//! Databricks environments themselves live in the environment configuration file.
//!
//! # Resolution
//!
//! 1. `DATABRICKS_MCP_CONFIG` environment variable (explicit path)
//! 2. `./databricks-mcp.toml` (current directory)
//! 3. `databricks-mcp/databricks-mcp.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `DATABRICKS_MCP_<SECTION>_<KEY>`:
//! - `DATABRICKS_MCP_SERVER_LOG_LEVEL=debug`
//! - `DATABRICKS_MCP_WATCH_ENABLED=false`
//! - `DATABRICKS_MCP_DATABRICKS_AUTH_TIMEOUT_SECS=20`
//!
//! `DATABRICKS_CLI_PATH` is also honoured.
//!
//! # Example
//!
//! ```rust,no_run
//! use databricks_mcp::config::SettingsLoader;
//!
//! let loader = SettingsLoader::load()?;
//! println!("environments: {}", loader.settings().environments.file.display());
//! # Ok::<(), databricks_mcp::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    apply_env_overrides, get_default_settings_path, resolve_settings_path, validate_settings,
    SettingsLoader,
};
pub use schema::{
    DatabricksSettings, EnvironmentFiles, LogFormat, LoggingSettings, ServerSettings, Settings,
    WatchSettings,
};
