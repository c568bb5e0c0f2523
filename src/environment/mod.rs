//! Multi-environment Databricks credential management.
//!
//! ```text
//! environments.yaml / .env ──> loader ──> validator ──> ConfigurationSet
//!                                                            │
//!                         watcher ──reload()──> manager <────┘
//!                                                  │
//!                                         get_active_credentials()
//! ```

pub mod error;
pub mod loader;
pub mod manager;
pub mod model;
pub mod validator;
#[cfg(feature = "hot-reload")]
pub mod watcher;

pub use error::{LoadError, ReloadError, StartupError, SwitchError, ValidationError};
pub use loader::{ConfigFormat, ConfigLoader, ConfigOrigin, LoadedDocument};
pub use manager::{EnvironmentManager, ReloadOutcome, SwitchOutcome};
pub use model::{
    mask_token, ActiveCredentials, ActiveSelection, Auth, AuthMethod, ConfigurationSet,
    CurrentEnvironment, EnvironmentConfig, EnvironmentDocument, EnvironmentSummary, SecretToken,
};
pub use validator::validate;
#[cfg(feature = "hot-reload")]
pub use watcher::{ConfigWatcher, WatchError, WatchOptions};
