//! Environment file loading with legacy `.env` fallback.
//!
//! The loader is a pure parse step: it turns a file into an [`EnvironmentDocument`]
//! and never touches live state. Cross-field checks happen in the validator.

use super::error::LoadError;
use super::model::{
    ConfigurationSet, EnvironmentDocument, EnvironmentEntries, EnvironmentEntry,
    LEGACY_ENVIRONMENT_NAME,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default structured configuration file
pub const DEFAULT_ENVIRONMENTS_FILE: &str = "environments.yaml";

/// Default legacy single-environment file
pub const DEFAULT_LEGACY_FILE: &str = ".env";

pub const LEGACY_HOST_KEY: &str = "DATABRICKS_HOST";
pub const LEGACY_TOKEN_KEY: &str = "DATABRICKS_TOKEN";
pub const LEGACY_HTTP_PATH_KEY: &str = "DATABRICKS_HTTP_PATH";

const MAX_DESCRIPTION_LEN: usize = 200;
const MAX_TAG_LEN: usize = 30;
const MAX_PROFILE_LEN: usize = 100;

static HTTP_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/sql/1\.0/warehouses/.+$").expect("valid http_path pattern"));

pub(crate) static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier pattern"));

/// On-disk syntax of a structured environments file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` selects TOML; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Which file a configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Structured(PathBuf),
    Legacy(PathBuf),
}

impl ConfigOrigin {
    pub fn path(&self) -> &Path {
        match self {
            Self::Structured(p) | Self::Legacy(p) => p,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(p) => write!(f, "{}", p.display()),
            Self::Legacy(p) => write!(f, "{} (legacy)", p.display()),
        }
    }
}

/// A candidate document together with where it was read from.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: EnvironmentDocument,
    pub origin: ConfigOrigin,
}

/// Resolves and reads the environments file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoader {
    structured: PathBuf,
    legacy: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_ENVIRONMENTS_FILE, DEFAULT_LEGACY_FILE)
    }
}

impl ConfigLoader {
    pub fn new(structured: impl Into<PathBuf>, legacy: impl Into<PathBuf>) -> Self {
        Self {
            structured: structured.into(),
            legacy: legacy.into(),
        }
    }

    pub fn structured_path(&self) -> &Path {
        &self.structured
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy
    }

    /// Load the structured file, falling back to the legacy file when it is absent.
    ///
    /// # Errors
    ///
    /// - `LoadError::NotFound` if neither file exists
    /// - `LoadError::Parse` / `LoadError::Schema` for a malformed file
    pub fn load(&self) -> Result<LoadedDocument, LoadError> {
        if self.structured.exists() {
            if self.legacy.exists() {
                warn!(
                    structured = %self.structured.display(),
                    legacy = %self.legacy.display(),
                    "both configuration files exist; using the structured file"
                );
            }
            let document = Self::load_structured(&self.structured)?;
            return Ok(LoadedDocument {
                document,
                origin: ConfigOrigin::Structured(self.structured.clone()),
            });
        }

        if self.legacy.exists() {
            warn!(
                structured = %self.structured.display(),
                legacy = %self.legacy.display(),
                "structured configuration not found, falling back to legacy file"
            );
            let document = Self::load_legacy(&self.legacy)?;
            return Ok(LoadedDocument {
                document,
                origin: ConfigOrigin::Legacy(self.legacy.clone()),
            });
        }

        Err(LoadError::NotFound {
            structured: self.structured.clone(),
            legacy: self.legacy.clone(),
        })
    }

    /// Read and parse a structured (YAML or TOML) environments file.
    pub fn load_structured(path: &Path) -> Result<EnvironmentDocument, LoadError> {
        let content = read_file(path)?;
        let document = parse_structured(&content, ConfigFormat::from_path(path), path)?;
        info!(
            source = %path.display(),
            environments = document.environments.len(),
            "configuration file parsed"
        );
        Ok(document)
    }

    /// Read a legacy flat `.env` file as a single `default` environment.
    ///
    /// Process environment variables with the same keys take precedence over the file.
    pub fn load_legacy(path: &Path) -> Result<EnvironmentDocument, LoadError> {
        let content = read_file(path)?;
        parse_legacy(&content, path, |key| std::env::var(key).ok())
    }

    /// Write a configuration set in the format implied by `path`.
    pub fn save(set: &ConfigurationSet, path: &Path) -> Result<(), LoadError> {
        let content = render(set, ConfigFormat::from_path(path))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LoadError::Write {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| LoadError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Serialize a configuration set to YAML or TOML text.
pub fn render(set: &ConfigurationSet, format: ConfigFormat) -> Result<String, LoadError> {
    let document = set.to_document();
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(&document).map_err(|e| LoadError::Serialize(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(&document).map_err(|e| LoadError::Serialize(e.to_string()))
        }
    }
}

/// Parse structured text in two stages: syntax first (`Parse`), then shape (`Schema`).
pub fn parse_structured(
    content: &str,
    format: ConfigFormat,
    path: &Path,
) -> Result<EnvironmentDocument, LoadError> {
    if content.trim().is_empty() {
        return Err(LoadError::schema(path, "<root>", "configuration file is empty"));
    }

    let document: EnvironmentDocument = match format {
        ConfigFormat::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| LoadError::parse(path, e))?;
            if value.is_null() {
                return Err(LoadError::schema(path, "<root>", "configuration file is empty"));
            }
            serde_yaml::from_value(value).map_err(|e| schema_from_message(path, e.to_string()))?
        }
        ConfigFormat::Toml => {
            let table: toml::Table = content.parse().map_err(|e| LoadError::parse(path, e))?;
            if table.is_empty() {
                return Err(LoadError::schema(path, "<root>", "configuration file is empty"));
            }
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| schema_from_message(path, e.message().to_string()))?
        }
    };

    check_fields(path, &document)?;
    Ok(document)
}

/// Attribute serde's "missing field `x`" messages to the field they name.
fn schema_from_message(path: &Path, message: String) -> LoadError {
    let field = message
        .split('`')
        .nth(1)
        .filter(|_| message.contains("missing field"))
        .unwrap_or("<document>")
        .to_string();
    LoadError::schema(path, field, message)
}

/// Field-level format checks on values that are present.
fn check_fields(path: &Path, document: &EnvironmentDocument) -> Result<(), LoadError> {
    for (key, entry) in document.environments.iter() {
        let field = |name: &str| format!("environments.{key}.{name}");

        if let Some(host) = &entry.host {
            let host = host.trim();
            if host.starts_with("http://") || host.starts_with("https://") {
                return Err(LoadError::schema(
                    path,
                    field("host"),
                    "host must not include a protocol (http:// or https://)",
                ));
            }
        }

        if let Some(http_path) = &entry.http_path {
            let http_path = http_path.trim();
            if !http_path.is_empty() && !HTTP_PATH_PATTERN.is_match(http_path) {
                return Err(LoadError::schema(
                    path,
                    field("http_path"),
                    format!("'{http_path}' does not match /sql/1.0/warehouses/<id>"),
                ));
            }
        }

        if let Some(profile) = &entry.profile {
            let profile = profile.trim();
            if profile.len() > MAX_PROFILE_LEN {
                return Err(LoadError::schema(
                    path,
                    field("profile"),
                    format!("profile name exceeds {MAX_PROFILE_LEN} characters"),
                ));
            }
            if !profile.is_empty() && !IDENTIFIER_PATTERN.is_match(profile) {
                return Err(LoadError::schema(
                    path,
                    field("profile"),
                    "profile name must contain only alphanumeric characters, hyphens, and underscores",
                ));
            }
        }

        if let Some(description) = &entry.description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(LoadError::schema(
                    path,
                    field("description"),
                    format!("description exceeds {MAX_DESCRIPTION_LEN} characters"),
                ));
            }
        }

        for tag in &entry.tags {
            if tag.chars().count() > MAX_TAG_LEN {
                return Err(LoadError::schema(
                    path,
                    field("tags"),
                    format!("tag '{tag}' exceeds {MAX_TAG_LEN} characters"),
                ));
            }
            if !IDENTIFIER_PATTERN.is_match(tag) {
                return Err(LoadError::schema(
                    path,
                    field("tags"),
                    format!("tag '{tag}' contains invalid characters"),
                ));
            }
        }
    }
    Ok(())
}

/// Build a single-environment document from `.env` content.
///
/// `lookup` consults the process environment; its values win over the file's.
pub fn parse_legacy(
    content: &str,
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EnvironmentDocument, LoadError> {
    let values = parse_dotenv_contents(content);
    let get = |key: &str| {
        lookup(key)
            .or_else(|| values.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    };

    let host = get(LEGACY_HOST_KEY);
    let token = get(LEGACY_TOKEN_KEY);
    let http_path = get(LEGACY_HTTP_PATH_KEY);

    let missing: Vec<&str> = [
        (LEGACY_HOST_KEY, host.is_none()),
        (LEGACY_TOKEN_KEY, token.is_none()),
        (LEGACY_HTTP_PATH_KEY, http_path.is_none()),
    ]
    .into_iter()
    .filter_map(|(key, absent)| absent.then_some(key))
    .collect();

    if !missing.is_empty() {
        return Err(LoadError::schema(
            path,
            missing.join(", "),
            "missing required keys in legacy environment file",
        ));
    }

    let entry = EnvironmentEntry {
        name: Some(LEGACY_ENVIRONMENT_NAME.to_string()),
        host,
        token,
        profile: None,
        http_path,
        description: Some(format!("Migrated from {}", path.display())),
        tags: Vec::new(),
    };

    let document = EnvironmentDocument {
        default: LEGACY_ENVIRONMENT_NAME.to_string(),
        environments: EnvironmentEntries(vec![(LEGACY_ENVIRONMENT_NAME.to_string(), entry)]),
    };
    check_fields(path, &document)?;

    info!(source = %path.display(), "legacy configuration loaded (1 environment)");
    Ok(document)
}

/// `KEY=value` lines; blank lines, `#` comments and an `export ` prefix are accepted.
pub fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), parse_dotenv_value(value));
    }
    map
}

fn parse_dotenv_value(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return rest[..end].to_string();
            }
        }
    }
    // Unquoted: strip a trailing ` # comment`.
    match trimmed.find(" #") {
        Some(idx) => trimmed[..idx].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}
