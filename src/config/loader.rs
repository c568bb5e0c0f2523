//! Settings loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Settings;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "DATABRICKS_MCP";

/// Settings file name
const SETTINGS_FILE_NAME: &str = "databricks-mcp.toml";

/// Environment variable for explicit settings path
const SETTINGS_PATH_ENV: &str = "DATABRICKS_MCP_CONFIG";

/// Loaded settings together with the file they came from.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    /// Resolved settings file path (if any)
    pub settings_path: Option<PathBuf>,
    pub settings: Settings,
}

impl SettingsLoader {
    /// Load settings using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `DATABRICKS_MCP_CONFIG` environment variable (explicit path, must exist)
    /// 2. `./databricks-mcp.toml`
    /// 3. `<platform config dir>/databricks-mcp/databricks-mcp.toml`
    /// 4. Built-in defaults
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        Self::resolve(None, |_| {})
    }

    /// Load settings from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::resolve(Some(path.as_ref()), |_| {})
    }

    /// Read settings from `explicit` (or the standard resolution order), apply
    /// environment overrides, then `adjust`, and validate the result once.
    pub fn resolve(explicit: Option<&Path>, adjust: impl FnOnce(&mut Settings)) -> ConfigResult<Self> {
        let explicit = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var(SETTINGS_PATH_ENV).ok().map(PathBuf::from),
        };

        let settings_path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path)),
            Some(path) => Some(path),
            None => resolve_settings_path(),
        };
        let mut settings = match settings_path {
            Some(ref path) => load_from_file(path)?,
            None => Settings::default(),
        };

        apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
        adjust(&mut settings);
        validate_settings(&settings)?;

        Ok(Self {
            settings_path,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Write the current settings to `path`.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.settings, path.as_ref())
    }
}

/// Resolve the settings file path from the working directory and platform config dir.
pub fn resolve_settings_path() -> Option<PathBuf> {
    let cwd_settings = PathBuf::from(SETTINGS_FILE_NAME);
    if cwd_settings.exists() {
        return Some(cwd_settings);
    }

    get_default_settings_path().filter(|p| p.exists())
}

/// Platform-specific settings file location, whether or not it exists.
pub fn get_default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "databricks-mcp").map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

fn save_to_file(settings: &Settings, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("invalid {what}: '{value}'")))
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse(var, format!("invalid boolean: '{value}'"))),
    }
}

/// Apply environment variable overrides.
///
/// Variables follow the pattern `DATABRICKS_MCP_<SECTION>_<KEY>`, for example
/// `DATABRICKS_MCP_WATCH_DEBOUNCE_MS=250`. `DATABRICKS_CLI_PATH` is honoured as a
/// fallback for the CLI location.
pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    let var = |key: &str| format!("{ENV_PREFIX}_{key}");

    // Server / logging
    if let Some(val) = lookup(&var("SERVER_LOG_LEVEL")) {
        settings.server.log_level = val;
    }
    if let Some(val) = lookup(&var("LOGGING_FORMAT")) {
        settings.logging.format = val
            .parse()
            .map_err(|message: String| ConfigError::env_parse(var("LOGGING_FORMAT"), message))?;
    }

    // Environment files
    if let Some(val) = lookup(&var("ENVIRONMENTS_FILE")) {
        settings.environments.file = PathBuf::from(val);
    }
    if let Some(val) = lookup(&var("ENVIRONMENTS_LEGACY_FILE")) {
        settings.environments.legacy_file = PathBuf::from(val);
    }

    // Watch
    if let Some(val) = lookup(&var("WATCH_ENABLED")) {
        settings.watch.enabled = parse_bool(&var("WATCH_ENABLED"), &val)?;
    }
    if let Some(val) = lookup(&var("WATCH_DEBOUNCE_MS")) {
        settings.watch.debounce_ms = parse_env(&var("WATCH_DEBOUNCE_MS"), &val, "milliseconds")?;
    }
    if let Some(val) = lookup(&var("WATCH_POLL_INTERVAL_MS")) {
        settings.watch.poll_interval_ms =
            parse_env(&var("WATCH_POLL_INTERVAL_MS"), &val, "milliseconds")?;
    }

    // Databricks (also support legacy DATABRICKS_CLI_PATH)
    if let Some(val) = lookup(&var("DATABRICKS_CLI_PATH")).or_else(|| lookup("DATABRICKS_CLI_PATH"))
    {
        settings.databricks.cli_path = PathBuf::from(val);
    }
    if let Some(val) = lookup(&var("DATABRICKS_AUTH_TIMEOUT_SECS")) {
        settings.databricks.auth_timeout_secs =
            parse_env(&var("DATABRICKS_AUTH_TIMEOUT_SECS"), &val, "seconds")?;
    }
    if let Some(val) = lookup(&var("DATABRICKS_REQUEST_TIMEOUT_SECS")) {
        settings.databricks.request_timeout_secs =
            parse_env(&var("DATABRICKS_REQUEST_TIMEOUT_SECS"), &val, "seconds")?;
    }

    Ok(())
}

/// Reject values that would only fail later at runtime.
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    if settings.server.log_level.parse::<tracing::Level>().is_err() {
        return Err(ConfigError::validation(
            "server.log_level",
            format!(
                "'{}' is not one of trace, debug, info, warn, error",
                settings.server.log_level
            ),
        ));
    }
    if settings.environments.file.as_os_str().is_empty() {
        return Err(ConfigError::validation("environments.file", "must not be empty"));
    }
    if settings.watch.poll_interval_ms == 0 {
        return Err(ConfigError::validation("watch.poll_interval_ms", "must be greater than 0"));
    }
    if settings.databricks.auth_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "databricks.auth_timeout_secs",
            "must be greater than 0",
        ));
    }
    if settings.databricks.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "databricks.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    Ok(())
}
