//! Shared fixtures for the integration tests.
//!
//! Every test gets its own temp directory holding `environments.yaml` (and optionally
//! a legacy `.env`), so tests never touch the working directory.

#![allow(dead_code)]

use databricks_mcp::config::Settings;
use databricks_mcp::environment::{ConfigLoader, EnvironmentManager};
use databricks_mcp::state::AppState;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const ENVIRONMENTS_FILE: &str = "environments.yaml";
pub const LEGACY_FILE: &str = ".env";

/// Three environments: token auth for dev, profile auth for prod and staging.
pub const DEV_PROD_STAGING: &str = r#"
default: dev
environments:
  dev:
    host: dev.cloud.databricks.com
    token: dapi-dev-0123456789
    http_path: /sql/1.0/warehouses/dev
    description: Development workspace
    tags: [dev, sandbox]
  prod:
    host: prod.cloud.databricks.com
    profile: prod-profile
    http_path: /sql/1.0/warehouses/prod
    description: Production workspace
    tags: [prod]
  staging:
    host: staging.cloud.databricks.com
    profile: staging-profile
    http_path: /sql/1.0/warehouses/staging
"#;

/// `DEV_PROD_STAGING` without `prod`.
pub const DEV_STAGING: &str = r#"
default: dev
environments:
  dev:
    host: dev.cloud.databricks.com
    token: dapi-dev-0123456789
    http_path: /sql/1.0/warehouses/dev
  staging:
    host: staging.cloud.databricks.com
    profile: staging-profile
    http_path: /sql/1.0/warehouses/staging
"#;

pub const LEGACY_ENV: &str = "\
# single workspace
DATABRICKS_HOST=legacy.cloud.databricks.com
DATABRICKS_TOKEN=\"dapi-legacy-9876543210\"
DATABRICKS_HTTP_PATH=/sql/1.0/warehouses/legacy
";

/// Temp directory with the two configuration file paths resolved inside it.
pub struct ConfigDir {
    pub dir: TempDir,
}

impl ConfigDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn with_environments(content: &str) -> Self {
        let config = Self::new();
        config.write_environments(content);
        config
    }

    pub fn with_legacy(content: &str) -> Self {
        let config = Self::new();
        config.write_legacy(content);
        config
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn environments_path(&self) -> PathBuf {
        self.dir.path().join(ENVIRONMENTS_FILE)
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.dir.path().join(LEGACY_FILE)
    }

    pub fn write_environments(&self, content: &str) {
        fs::write(self.environments_path(), content).expect("write environments file");
    }

    pub fn write_legacy(&self, content: &str) {
        fs::write(self.legacy_path(), content).expect("write legacy file");
    }

    pub fn remove_environments(&self) {
        fs::remove_file(self.environments_path()).expect("remove environments file");
    }

    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(self.environments_path(), self.legacy_path())
    }

    pub fn manager(&self) -> Arc<EnvironmentManager> {
        Arc::new(EnvironmentManager::initialize(self.loader()).expect("valid configuration"))
    }

    /// Settings pointing at this directory, with a CLI path that does not exist.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.environments.file = self.environments_path();
        settings.environments.legacy_file = self.legacy_path();
        settings.watch.enabled = false;
        settings.databricks.cli_path = self.dir.path().join("no-such-databricks-cli");
        settings.databricks.request_timeout_secs = 2;
        settings
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.manager(), &self.settings()).expect("build app state")
    }
}

/// Names from a `list_environments` payload, in listed order.
pub fn environment_names(listing: &Value) -> Vec<String> {
    listing["environments"]
        .as_array()
        .expect("environments array")
        .iter()
        .map(|env| env["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Find the entry called `name` in a `list_environments` payload.
pub fn find_environment<'a>(listing: &'a Value, name: &str) -> &'a Value {
    listing["environments"]
        .as_array()
        .expect("environments array")
        .iter()
        .find(|env| env["name"] == name)
        .unwrap_or_else(|| panic!("environment {name} missing from {listing}"))
}
