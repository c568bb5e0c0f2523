//! Databricks MCP Server Library
//!
//! Exposes Databricks workspaces to MCP clients over stdio, with credentials drawn from
//! a set of named environments that can be switched at runtime and reloaded from disk.
//!
//! # Modules
//!
//! - `environment`: environment configuration loading, validation, switching and hot reload
//! - `config`: server settings with TOML support and environment overrides
//! - `logging`: tracing subscriber setup (stderr only)
//! - `service`: read-only Databricks REST calls using the active credentials
//! - `state`: shared state handed to the MCP handler
//! - `error`: tool-facing error type
//! - `mcp`: MCP tools and server handler (when `mcp` feature is enabled)

pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod service;
pub mod state;

#[cfg(feature = "mcp")]
pub mod mcp;

pub use config::{ConfigError, Settings, SettingsLoader};
pub use environment::{
    ActiveCredentials, Auth, ConfigLoader, ConfigurationSet, EnvironmentConfig,
    EnvironmentManager, LoadError, ReloadError, StartupError, SwitchError, ValidationError,
};
pub use error::{AppError, AppResult};
pub use service::{WorkspaceError, WorkspaceService};
pub use state::AppState;

#[cfg(feature = "hot-reload")]
pub use environment::{ConfigWatcher, WatchOptions};
