//! Environment manager: owns the validated configuration and the active selection.
//!
//! # Concurrency
//!
//! ```text
//! tool calls ──load()──> ArcSwap<Snapshot>  <──store()── switch / reload
//!                                                  │
//!                                            writer mutex
//! ```
//!
//! Readers never lock: they load the current snapshot, which holds the configuration
//! set and the active selection together, so a reader sees either the old pair or the
//! new pair. Writers build the replacement snapshot off to the side and publish it with
//! a single store while holding the writer mutex, which serializes `switch` against
//! `reload`.
//!
//! Reloads additionally hold the reload mutex from reading the file until the store, so
//! the last reload to publish is always the last one to read the file. `switch` does
//! not wait on file I/O.

use super::error::{ReloadError, StartupError, SwitchError};
use super::loader::{ConfigLoader, ConfigOrigin};
use super::model::{
    ActiveCredentials, ActiveSelection, ConfigurationSet, CurrentEnvironment, EnvironmentConfig,
    EnvironmentSummary,
};
use super::validator::validate;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One consistent view of the configuration and the selection made from it.
#[derive(Debug)]
struct Snapshot {
    configuration: Arc<ConfigurationSet>,
    origin: ConfigOrigin,
    active: ActiveSelection,
    environment: Arc<EnvironmentConfig>,
    generation: u64,
}

/// Result of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadOutcome {
    pub source: String,
    pub environments: usize,
    pub active: String,
    /// The previously active environment disappeared and the default was selected.
    pub active_reset: bool,
    /// Value of [`EnvironmentManager::generation`] after this reload.
    pub generation: u64,
}

/// Result of a successful switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    pub previous: String,
    pub selection: ActiveSelection,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Holds the current environment configuration and active selection.
///
/// Constructed once at startup and shared via `Arc` with the tool handlers and
/// the configuration watcher.
pub struct EnvironmentManager {
    loader: ConfigLoader,
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    reloader: Mutex<()>,
}

impl std::fmt::Debug for EnvironmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("loader", &self.loader)
            .field("current", &self.current.load())
            .finish()
    }
}

impl EnvironmentManager {
    /// Load and validate the configuration and select its default environment.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: the server must not start without a valid configuration.
    pub fn initialize(loader: ConfigLoader) -> Result<Self, StartupError> {
        let (configuration, origin) = Self::load_validated(&loader)?;
        info!(
            source = %origin,
            environments = configuration.len(),
            default = configuration.default_name(),
            "environment configuration loaded"
        );
        Ok(Self::with_configuration(loader, configuration, origin))
    }

    /// Build a manager around an already validated set.
    pub fn with_configuration(
        loader: ConfigLoader,
        configuration: ConfigurationSet,
        origin: ConfigOrigin,
    ) -> Self {
        let environment = Arc::clone(configuration.default_environment());
        let active = ActiveSelection::now(configuration.default_name());
        info!(
            environment = %active.name,
            host = %environment.host,
            "active environment set to default"
        );

        Self {
            loader,
            current: ArcSwap::from_pointee(Snapshot {
                configuration: Arc::new(configuration),
                origin,
                active,
                environment,
                generation: 0,
            }),
            writer: Mutex::new(()),
            reloader: Mutex::new(()),
        }
    }

    fn load_validated(
        loader: &ConfigLoader,
    ) -> Result<(ConfigurationSet, ConfigOrigin), ReloadError> {
        let loaded = loader.load()?;
        let configuration = validate(loaded.document)?;
        Ok((configuration, loaded.origin))
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    /// Credentials of the active environment. Never blocks.
    pub fn get_active_credentials(&self) -> ActiveCredentials {
        let snapshot = self.current.load();
        let env = &snapshot.environment;
        ActiveCredentials {
            environment: env.name.clone(),
            host: env.host.clone(),
            http_path: env.http_path.clone(),
            auth: env.auth.clone(),
        }
    }

    pub fn active_selection(&self) -> ActiveSelection {
        self.current.load().active.clone()
    }

    pub fn active_name(&self) -> String {
        self.current.load().active.name.clone()
    }

    pub fn configuration(&self) -> Arc<ConfigurationSet> {
        Arc::clone(&self.current.load().configuration)
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.current.load().origin.clone()
    }

    /// Successful reloads since startup.
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn get_current_environment(&self) -> CurrentEnvironment {
        let snapshot = self.current.load();
        let env = &snapshot.environment;
        CurrentEnvironment {
            name: env.name.clone(),
            host: env.host.clone(),
            http_path: env.http_path.clone(),
            description: env.description.clone(),
            tags: env.tags.clone(),
            auth_method: env.auth.method(),
            is_default: snapshot.configuration.default_name() == env.name,
            activated_at: snapshot.active.activated_at,
        }
    }

    /// All environments in declaration order.
    pub fn list_environments(&self) -> Vec<EnvironmentSummary> {
        let snapshot = self.current.load();
        let default = snapshot.configuration.default_name();
        snapshot
            .configuration
            .iter()
            .map(|env| EnvironmentSummary {
                name: env.name.clone(),
                host: env.host.clone(),
                description: env.description.clone(),
                tags: env.tags.clone(),
                auth_method: env.auth.method(),
                is_default: env.name == default,
                is_active: env.name == snapshot.active.name,
            })
            .collect()
    }

    /// Make `name` the active environment.
    ///
    /// Switching to the already active environment succeeds and refreshes `activated_at`.
    ///
    /// # Errors
    ///
    /// `SwitchError::UnknownEnvironment` if `name` is not configured; nothing changes.
    pub fn switch(&self, name: &str) -> Result<SwitchOutcome, SwitchError> {
        let _guard = self.writer.lock();
        let current = self.current.load_full();

        let Some(target) = current.configuration.get(name) else {
            let err = SwitchError::UnknownEnvironment {
                requested: name.to_string(),
                available: current.configuration.names(),
            };
            warn!(
                requested = err.requested(),
                available = ?err.available(),
                "environment switch rejected"
            );
            return Err(err);
        };

        let previous = current.active.name.clone();
        let selection = ActiveSelection::now(name);
        self.current.store(Arc::new(Snapshot {
            configuration: Arc::clone(&current.configuration),
            origin: current.origin.clone(),
            active: selection.clone(),
            environment: Arc::clone(target),
            generation: current.generation,
        }));

        if previous == name {
            info!(environment = name, "environment re-selected");
        } else {
            info!(from = %previous, to = name, host = %target.host, "environment switched");
        }

        Ok(SwitchOutcome {
            previous,
            selection,
            host: target.host.clone(),
            description: target.description.clone(),
            tags: target.tags.clone(),
        })
    }

    /// Reload from the same files used at startup.
    ///
    /// On failure the previous configuration and selection are retained and the error
    /// is logged; a bad edit never takes the server down.
    pub fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        let _reload = self.reloader.lock();
        info!(source = %self.loader.structured_path().display(), "configuration reload triggered");

        let (configuration, origin) = match Self::load_validated(&self.loader) {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(
                    error = %err,
                    subject = ?err.subject(),
                    active = %self.active_name(),
                    "configuration reload rejected, keeping current configuration"
                );
                return Err(err);
            }
        };

        let _guard = self.writer.lock();
        let current = self.current.load_full();

        let (active, environment, active_reset) = match configuration.get(&current.active.name) {
            Some(env) => (current.active.clone(), Arc::clone(env), false),
            None => {
                let fallback = configuration.default_environment();
                warn!(
                    removed = %current.active.name,
                    fallback = %fallback.name,
                    "active environment no longer exists, resetting to default"
                );
                (
                    ActiveSelection::now(fallback.name.clone()),
                    Arc::clone(fallback),
                    true,
                )
            }
        };

        let outcome = ReloadOutcome {
            source: origin.to_string(),
            environments: configuration.len(),
            active: active.name.clone(),
            active_reset,
            generation: current.generation + 1,
        };

        self.current.store(Arc::new(Snapshot {
            configuration: Arc::new(configuration),
            origin,
            active,
            environment,
            generation: outcome.generation,
        }));

        info!(
            source = %outcome.source,
            environments = outcome.environments,
            active = %outcome.active,
            generation = outcome.generation,
            "configuration reload successful"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::error::{LoadError, ValidationError};
    use crate::environment::model::Auth;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const DEV_PROD: &str = r#"
default: dev
environments:
  dev:
    host: dev.cloud.databricks.com
    token: dapi-dev-token-000
    http_path: /sql/1.0/warehouses/dev123
  prod:
    host: prod.cloud.databricks.com
    profile: prod-profile
    http_path: /sql/1.0/warehouses/prod456
"#;

    fn manager_with(dir: &TempDir, content: &str) -> EnvironmentManager {
        let path = dir.path().join("environments.yaml");
        fs::write(&path, content).unwrap();
        EnvironmentManager::initialize(ConfigLoader::new(&path, dir.path().join(".env"))).unwrap()
    }

    fn rewrite(dir: &TempDir, content: &str) {
        fs::write(dir.path().join("environments.yaml"), content).unwrap();
    }

    #[test]
    fn test_initialize_selects_default() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        assert_eq!(manager.active_name(), "dev");
        let creds = manager.get_active_credentials();
        assert_eq!(creds.host, "dev.cloud.databricks.com");
        assert!(matches!(creds.auth, Auth::Token(_)));
        assert!(manager.get_current_environment().is_default);
    }

    #[test]
    fn test_initialize_fails_without_files() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(dir.path().join("environments.yaml"), dir.path().join(".env"));
        let err = EnvironmentManager::initialize(loader).unwrap_err();
        assert!(matches!(err, StartupError::Load(LoadError::NotFound { .. })));
    }

    #[test]
    fn test_initialize_fails_on_invalid_configuration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("environments.yaml");
        fs::write(&path, DEV_PROD.replace("default: dev", "default: qa")).unwrap();
        let err = EnvironmentManager::initialize(ConfigLoader::new(&path, dir.path().join(".env")))
            .unwrap_err();
        assert!(matches!(
            err,
            StartupError::Validation(ValidationError::UnknownDefault { .. })
        ));
    }

    #[test]
    fn test_switch_changes_credentials() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        let outcome = manager.switch("prod").unwrap();
        assert_eq!(outcome.previous, "dev");
        assert_eq!(outcome.host, "prod.cloud.databricks.com");
        let creds = manager.get_active_credentials();
        assert_eq!(creds.environment, "prod");
        assert_eq!(creds.auth, Auth::Profile("prod-profile".to_string()));
    }

    #[test]
    fn test_switch_is_idempotent_and_refreshes_timestamp() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        let first = manager.switch("prod").unwrap().selection;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = manager.switch("prod").unwrap().selection;
        assert_eq!(first.name, second.name);
        assert!(second.activated_at > first.activated_at);
        assert_eq!(manager.active_name(), "prod");
    }

    #[test]
    fn test_switch_unknown_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        let before = manager.active_selection();
        let config_before = manager.configuration();

        let err = manager.switch("staging").unwrap_err();
        assert_eq!(err.available(), ["dev".to_string(), "prod".to_string()]);
        assert_eq!(manager.active_selection(), before);
        assert!(Arc::ptr_eq(&config_before, &manager.configuration()));
    }

    #[test]
    fn test_reload_keeps_active_and_updates_values() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        manager.switch("prod").unwrap();
        let selected = manager.active_selection();

        rewrite(&dir, &DEV_PROD.replace("prod.cloud", "prod2.cloud"));
        let outcome = manager.reload().unwrap();

        assert!(!outcome.active_reset);
        assert_eq!(manager.active_selection(), selected);
        assert_eq!(manager.get_active_credentials().host, "prod2.cloud.databricks.com");
    }

    #[test]
    fn test_reload_failure_retains_previous_state() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        manager.switch("prod").unwrap();
        let selected = manager.active_selection();
        let config_before = manager.configuration();

        rewrite(&dir, "default: [broken\n");
        assert!(matches!(manager.reload(), Err(ReloadError::Load(LoadError::Parse { .. }))));

        rewrite(&dir, &DEV_PROD.replace("    profile: prod-profile\n", ""));
        assert!(matches!(
            manager.reload(),
            Err(ReloadError::Validation(ValidationError::IncompleteCredentials { .. }))
        ));

        assert_eq!(manager.active_selection(), selected);
        assert_eq!(*manager.configuration(), *config_before);
    }

    #[test]
    fn test_reload_removing_active_resets_to_default() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        manager.switch("prod").unwrap();

        let without_prod = DEV_PROD
            .split("  prod:")
            .next()
            .unwrap()
            .to_string();
        rewrite(&dir, &without_prod);
        let outcome = manager.reload().unwrap();

        assert!(outcome.active_reset);
        assert_eq!(outcome.active, "dev");
        assert_eq!(manager.active_name(), "dev");
    }

    #[test]
    fn test_reload_adds_environment_without_touching_selection() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        let selected = manager.active_selection();

        let with_qa = format!(
            "{DEV_PROD}  qa:\n    host: qa.cloud.databricks.com\n    profile: qa\n    http_path: /sql/1.0/warehouses/qa789\n"
        );
        rewrite(&dir, &with_qa);
        manager.reload().unwrap();

        let names: Vec<_> = manager.list_environments().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["dev", "prod", "qa"]);
        assert_eq!(manager.active_selection(), selected);
    }

    #[test]
    fn test_generation_counts_successful_reloads_only() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        assert_eq!(manager.generation(), 0);

        manager.switch("prod").unwrap();
        assert_eq!(manager.generation(), 0);

        assert_eq!(manager.reload().unwrap().generation, 1);
        rewrite(&dir, "default: [broken\n");
        assert!(manager.reload().is_err());
        assert_eq!(manager.generation(), 1);

        rewrite(&dir, DEV_PROD);
        manager.reload().unwrap();
        assert_eq!(manager.generation(), 2);
        assert_eq!(manager.active_name(), "prod");
    }

    #[test]
    fn test_list_marks_active_and_default() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, DEV_PROD);
        manager.switch("prod").unwrap();
        let list = manager.list_environments();
        assert!(list[0].is_default && !list[0].is_active);
        assert!(!list[1].is_default && list[1].is_active);
    }

    #[test]
    fn test_legacy_origin_reported() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".env");
        fs::write(
            &legacy,
            "DATABRICKS_HOST=h\nDATABRICKS_TOKEN=t\nDATABRICKS_HTTP_PATH=/sql/1.0/warehouses/x\n",
        )
        .unwrap();
        let loader = ConfigLoader::new(dir.path().join("environments.yaml"), &legacy);
        let manager = EnvironmentManager::initialize(loader).unwrap();
        assert!(manager.origin().is_legacy());
        assert_eq!(manager.origin().path(), Path::new(&legacy));
    }
}
