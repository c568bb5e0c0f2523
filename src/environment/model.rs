//! Environment data model.
//!
//! Validated values ([`EnvironmentConfig`], [`ConfigurationSet`]) are immutable once built;
//! a reload constructs a new set and replaces the old one wholesale. The loose,
//! file-shaped [`EnvironmentDocument`] is what the loader produces and the validator consumes.

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name given to the environment synthesized from a legacy `.env` file.
pub const LEGACY_ENVIRONMENT_NAME: &str = "default";

// ========== Secrets ==========

/// A personal access token. `Debug` and `Display` only ever show a short prefix.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The full token, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 8 characters followed by `...`, or `***` for short tokens.
    pub fn masked(&self) -> String {
        mask_token(&self.0)
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretToken({})", self.masked())
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Mask a credential for log output.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 8 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}

// ========== Validated model ==========

/// How an environment authenticates. Exactly one method, enforced by the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Personal access token stored in the configuration file.
    Token(SecretToken),
    /// Named profile in the Databricks CLI credential store (`~/.databrickscfg`).
    Profile(String),
}

impl Auth {
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Token(_) => AuthMethod::Token,
            Self::Profile(_) => AuthMethod::Profile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Token,
    Profile,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Profile => "profile",
        }
    }
}

/// One named credential profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub name: String,
    /// Workspace hostname without protocol.
    pub host: String,
    pub auth: Auth,
    /// SQL warehouse path, `/sql/1.0/warehouses/<id>`.
    pub http_path: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// A validated set of environments loaded from one file snapshot.
///
/// Invariants: at least one environment, `default` names one of them, and every
/// environment's name is unique. Only the validator constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSet {
    default: String,
    // Declaration order.
    environments: Vec<Arc<EnvironmentConfig>>,
    index: HashMap<String, usize>,
}

impl ConfigurationSet {
    pub(crate) fn new(default: String, environments: Vec<EnvironmentConfig>) -> Self {
        let environments: Vec<_> = environments.into_iter().map(Arc::new).collect();
        let index = environments
            .iter()
            .enumerate()
            .map(|(i, env)| (env.name.clone(), i))
            .collect();
        Self {
            default,
            environments,
            index,
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn default_environment(&self) -> &Arc<EnvironmentConfig> {
        // `default` is checked against the index when the set is validated.
        &self.environments[self.index[self.default.as_str()]]
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EnvironmentConfig>> {
        self.index.get(name).map(|&i| &self.environments[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Environments in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EnvironmentConfig>> {
        self.environments.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.environments.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Convert back into the file-shaped document (mapping form, names implied by keys).
    pub fn to_document(&self) -> EnvironmentDocument {
        let entries = self
            .environments
            .iter()
            .map(|env| {
                let (token, profile) = match &env.auth {
                    Auth::Token(t) => (Some(t.expose().to_string()), None),
                    Auth::Profile(p) => (None, Some(p.clone())),
                };
                let entry = EnvironmentEntry {
                    name: None,
                    host: Some(env.host.clone()),
                    token,
                    profile,
                    http_path: Some(env.http_path.clone()),
                    description: env.description.clone(),
                    tags: env.tags.clone(),
                };
                (env.name.clone(), entry)
            })
            .collect();

        EnvironmentDocument {
            default: self.default.clone(),
            environments: EnvironmentEntries(entries),
        }
    }
}

/// Runtime pointer to the selected environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSelection {
    pub name: String,
    pub activated_at: DateTime<Utc>,
}

impl ActiveSelection {
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activated_at: Utc::now(),
        }
    }
}

/// Snapshot of what a tool needs to build a Databricks client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCredentials {
    pub environment: String,
    pub host: String,
    pub http_path: String,
    pub auth: Auth,
}

/// One row of `list_environments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub name: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub auth_method: AuthMethod,
    pub is_default: bool,
    pub is_active: bool,
}

/// Details of the active environment. Never carries the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentEnvironment {
    pub name: String,
    pub host: String,
    pub http_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub auth_method: AuthMethod,
    pub is_default: bool,
    pub activated_at: DateTime<Utc>,
}

// ========== File-shaped document ==========

/// The structured file as written by an operator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDocument {
    pub default: String,
    pub environments: EnvironmentEntries,
}

/// An environment entry with every field optional; completeness is the validator's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Keyed entries in declaration order. Duplicate keys are kept so the validator can
/// report them.
///
/// Accepts either a mapping (`name: {..}`) or a list of entries that each carry `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentEntries(pub Vec<(String, EnvironmentEntry)>);

impl EnvironmentEntries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, EnvironmentEntry)> {
        self.0.iter()
    }
}

impl Serialize for EnvironmentEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, entry) in &self.0 {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvironmentEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = EnvironmentEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of environment name to settings, or a list of environments")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, entry)) = access.next_entry::<String, EnvironmentEntry>()? {
                    entries.push((key, entry));
                }
                Ok(EnvironmentEntries(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_element::<EnvironmentEntry>()? {
                    let key = entry
                        .name
                        .clone()
                        .ok_or_else(|| de::Error::missing_field("name"))?;
                    entries.push((key, entry));
                }
                Ok(EnvironmentEntries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor)
    }
}
