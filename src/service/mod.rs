//! Workspace service: read-only Databricks REST calls on behalf of the active environment.
//!
//! # Architecture
//!
//! ```text
//! MCP tools ──> WorkspaceService ──get_active_credentials()──> EnvironmentManager
//!                     │
//!                     ├── token auth:   configured token
//!                     └── profile auth: `<cli> auth token --profile <p>`
//! ```
//!
//! Every call takes one credential snapshot up front and uses it to the end, so a
//! concurrent switch or reload never mixes two environments within one request.

use crate::config::DatabricksSettings;
use crate::environment::{ActiveCredentials, Auth, EnvironmentManager, SecretToken};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

// ========== Error Types ==========

/// A workspace call failed. Every variant names the environment it ran against.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(
        "Databricks CLI '{}' not found while authenticating profile '{profile}'. \
         Install it or set databricks.cli_path. Current environment: {environment}. Use switch_environment to select a different environment.",
        .cli_path.display()
    )]
    CliNotFound {
        environment: String,
        profile: String,
        cli_path: PathBuf,
    },

    #[error(
        "Databricks CLI timed out after {}s getting a token for profile '{profile}'; credentials may have expired. \
         Run: databricks auth login --profile {profile}. Current environment: {environment}. Use switch_environment to select a different environment.",
        .timeout.as_secs()
    )]
    AuthTimeout {
        environment: String,
        profile: String,
        timeout: Duration,
    },

    #[error(
        "authentication failed for profile '{profile}': {message}. Current environment: {environment}. Use switch_environment to select a different environment."
    )]
    Auth {
        environment: String,
        profile: String,
        message: String,
    },

    #[error(
        "failed to reach Databricks at '{host}': {source}. Current environment: {environment}. Use switch_environment to select a different environment."
    )]
    Request {
        environment: String,
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "Databricks API returned {status} for '{endpoint}': {body}. Current environment: {environment}. Use switch_environment to select a different environment."
    )]
    Status {
        environment: String,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from '{endpoint}': {message}. Current environment: {environment}")]
    Decode {
        environment: String,
        endpoint: String,
        message: String,
    },
}

impl WorkspaceError {
    pub fn environment(&self) -> &str {
        match self {
            Self::CliNotFound { environment, .. }
            | Self::AuthTimeout { environment, .. }
            | Self::Auth { environment, .. }
            | Self::Request { environment, .. }
            | Self::Status { environment, .. }
            | Self::Decode { environment, .. } => environment,
        }
    }
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// A decoded API response together with the environment that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceResponse {
    pub environment: String,
    pub host: String,
    pub body: Value,
}

#[derive(Debug, Deserialize)]
struct CliToken {
    access_token: Option<String>,
}

// ========== Token resolution ==========

/// Mints bearer tokens for profile-based environments through the Databricks CLI.
#[derive(Debug, Clone)]
pub struct CliTokenSource {
    cli_path: PathBuf,
    timeout: Duration,
}

impl CliTokenSource {
    pub fn new(cli_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cli_path: cli_path.into(),
            timeout,
        }
    }

    /// Run `<cli> auth token --profile <profile>` and read `access_token` from its JSON output.
    pub async fn token_for_profile(
        &self,
        environment: &str,
        profile: &str,
    ) -> WorkspaceResult<SecretToken> {
        info!(environment, profile, "requesting token from Databricks CLI");

        let mut command = tokio::process::Command::new(&self.cli_path);
        command
            .args(["auth", "token", "--profile", profile])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                error!(environment, profile, timeout_secs = self.timeout.as_secs(), "Databricks CLI timed out");
                return Err(WorkspaceError::AuthTimeout {
                    environment: environment.to_string(),
                    profile: profile.to_string(),
                    timeout: self.timeout,
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(environment, cli = %self.cli_path.display(), "Databricks CLI not found");
                return Err(WorkspaceError::CliNotFound {
                    environment: environment.to_string(),
                    profile: profile.to_string(),
                    cli_path: self.cli_path.clone(),
                });
            }
            Ok(Err(e)) => {
                return Err(self.auth_error(environment, profile, e.to_string()));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(environment, profile, status = ?output.status.code(), stderr = %stderr, "Databricks CLI returned an error");
            return Err(self.auth_error(environment, profile, format!("CLI returned error: {stderr}")));
        }

        let parsed: CliToken = serde_json::from_slice(&output.stdout).map_err(|e| {
            self.auth_error(environment, profile, format!("failed to parse CLI output: {e}"))
        })?;

        let token = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .map(SecretToken::new)
            .ok_or_else(|| {
                self.auth_error(environment, profile, "no access_token in CLI response".to_string())
            })?;

        info!(environment, profile, token = %token, "obtained token from Databricks CLI");
        Ok(token)
    }

    fn auth_error(&self, environment: &str, profile: &str, message: String) -> WorkspaceError {
        WorkspaceError::Auth {
            environment: environment.to_string(),
            profile: profile.to_string(),
            message,
        }
    }
}

// ========== Service ==========

/// Issues read-only workspace requests using the manager's active credentials.
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    manager: Arc<EnvironmentManager>,
    http: reqwest::Client,
    tokens: CliTokenSource,
}

impl WorkspaceService {
    pub fn new(
        manager: Arc<EnvironmentManager>,
        settings: &DatabricksSettings,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("databricks-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            manager,
            http,
            tokens: CliTokenSource::new(&settings.cli_path, settings.auth_timeout()),
        })
    }

    pub fn manager(&self) -> &Arc<EnvironmentManager> {
        &self.manager
    }

    /// Bearer token for a credential snapshot.
    pub async fn bearer_token(&self, credentials: &ActiveCredentials) -> WorkspaceResult<SecretToken> {
        match &credentials.auth {
            Auth::Token(token) => Ok(token.clone()),
            Auth::Profile(profile) => {
                self.tokens
                    .token_for_profile(&credentials.environment, profile)
                    .await
            }
        }
    }

    /// GET `https://<host>/api/2.0/<endpoint>` against the active environment.
    pub async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> WorkspaceResult<WorkspaceResponse> {
        let credentials = self.manager.get_active_credentials();
        let token = self.bearer_token(&credentials).await?;
        let url = api_url(&credentials.host, endpoint);
        debug!(environment = %credentials.environment, %url, "workspace request");

        let request_error = |source: reqwest::Error| {
            error!(environment = %credentials.environment, error = %source, "workspace request failed");
            WorkspaceError::Request {
                environment: credentials.environment.clone(),
                host: credentials.host.clone(),
                source,
            }
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose())
            .query(query)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(environment = %credentials.environment, endpoint, status = status.as_u16(), "workspace request rejected");
            return Err(WorkspaceError::Status {
                environment: credentials.environment.clone(),
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let body: Value = response.json().await.map_err(|e| WorkspaceError::Decode {
            environment: credentials.environment.clone(),
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        Ok(WorkspaceResponse {
            environment: credentials.environment,
            host: credentials.host,
            body,
        })
    }

    pub async fn list_jobs(&self) -> WorkspaceResult<WorkspaceResponse> {
        self.get("jobs/list", &[]).await
    }

    pub async fn get_job(&self, job_id: i64) -> WorkspaceResult<WorkspaceResponse> {
        self.get("jobs/get", &[("job_id", job_id.to_string())]).await
    }

    pub async fn list_job_runs(&self, job_id: i64, limit: u32) -> WorkspaceResult<WorkspaceResponse> {
        self.get(
            "jobs/runs/list",
            &[("job_id", job_id.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    pub async fn list_clusters(&self) -> WorkspaceResult<WorkspaceResponse> {
        self.get("clusters/list", &[]).await
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> WorkspaceResult<WorkspaceResponse> {
        self.get("clusters/get", &[("cluster_id", cluster_id.to_string())])
            .await
    }
}

/// REST endpoint URL for a workspace host (stored without protocol).
pub fn api_url(host: &str, endpoint: &str) -> String {
    format!(
        "https://{}/api/2.0/{}",
        host.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
