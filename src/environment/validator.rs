//! Cross-field validation of a loaded environments document.
//!
//! Validation is all-or-nothing: the first violation is returned and nothing from
//! the candidate is kept. Checks run in this order:
//!
//! 1. at least one environment
//! 2. `default` names a declared environment
//! 3. every name is well formed and matches its key
//! 4. host, http_path and exactly one of token/profile are present
//! 5. no name is declared twice

use super::error::ValidationError;
use super::loader::IDENTIFIER_PATTERN;
use super::model::{
    Auth, ConfigurationSet, EnvironmentConfig, EnvironmentDocument, EnvironmentEntry, SecretToken,
};
use std::collections::HashSet;

const MAX_NAME_LEN: usize = 50;

/// Turn a candidate document into an immutable [`ConfigurationSet`].
pub fn validate(candidate: EnvironmentDocument) -> Result<ConfigurationSet, ValidationError> {
    let EnvironmentDocument {
        default,
        environments,
    } = candidate;

    if environments.is_empty() {
        return Err(ValidationError::NoEnvironments);
    }

    if !environments.iter().any(|(key, _)| *key == default) {
        let mut available: Vec<String> = Vec::new();
        for (key, _) in environments.iter() {
            if !available.contains(key) {
                available.push(key.clone());
            }
        }
        return Err(ValidationError::UnknownDefault { default, available });
    }

    for (key, entry) in environments.iter() {
        check_name(key)?;
        if let Some(name) = &entry.name {
            if name != key {
                return Err(ValidationError::NameMismatch {
                    key: key.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    let mut built = Vec::with_capacity(environments.len());
    for (key, entry) in environments.iter() {
        built.push(build_environment(key, entry)?);
    }

    let mut seen = HashSet::new();
    for (key, _) in environments.iter() {
        if !seen.insert(key.as_str()) {
            return Err(ValidationError::DuplicateName { name: key.clone() });
        }
    }

    Ok(ConfigurationSet::new(default, built))
}

/// Names are 1-50 characters of `[A-Za-z0-9_-]`.
pub fn check_name(name: &str) -> Result<(), ValidationError> {
    let reason = if name.is_empty() {
        "name must not be empty".to_string()
    } else if name.chars().count() > MAX_NAME_LEN {
        format!("name exceeds {MAX_NAME_LEN} characters")
    } else if !IDENTIFIER_PATTERN.is_match(name) {
        "name must contain only alphanumeric characters, hyphens, and underscores".to_string()
    } else {
        return Ok(());
    };

    Err(ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn build_environment(
    name: &str,
    entry: &EnvironmentEntry,
) -> Result<EnvironmentConfig, ValidationError> {
    let auth = match (present(&entry.token), present(&entry.profile)) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::AmbiguousAuth {
                name: name.to_string(),
            })
        }
        (Some(token), None) => Some(Auth::Token(SecretToken::new(token))),
        (None, Some(profile)) => Some(Auth::Profile(profile)),
        (None, None) => None,
    };

    match (present(&entry.host), present(&entry.http_path), auth) {
        (Some(host), Some(http_path), Some(auth)) => Ok(EnvironmentConfig {
            name: name.to_string(),
            host,
            auth,
            http_path,
            description: present(&entry.description),
            tags: entry.tags.clone(),
        }),
        (host, http_path, auth) => {
            let missing = [
                ("host", host.is_none()),
                ("http_path", http_path.is_none()),
                ("token or profile", auth.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();
            Err(ValidationError::IncompleteCredentials {
                name: name.to_string(),
                missing,
            })
        }
    }
}
