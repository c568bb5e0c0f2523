//! Shared application state handed to the MCP handler.

use crate::config::Settings;
use crate::environment::EnvironmentManager;
use crate::error::AppResult;
use crate::service::WorkspaceService;
use std::sync::Arc;

/// Everything a tool call needs. Built once in `main` and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: Arc<EnvironmentManager>,
    pub workspace: WorkspaceService,
}

impl AppState {
    pub fn new(manager: Arc<EnvironmentManager>, settings: &Settings) -> AppResult<Self> {
        let workspace = WorkspaceService::new(Arc::clone(&manager), &settings.databricks)?;
        Ok(Self { manager, workspace })
    }
}
