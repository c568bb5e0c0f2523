//! MCP tool surface.
//!
//! Tool bodies are plain async functions over [`AppState`] returning JSON, so they can be
//! exercised without a transport. [`DatabricksHandler`] maps `tools/call` requests onto them.

use crate::error::{AppError, AppResult};
use crate::service::WorkspaceResponse;
use crate::state::AppState;
use async_trait::async_trait;
use rust_mcp_sdk::error::SdkResult;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::mcp_server::{server_runtime, ServerHandler};
use rust_mcp_sdk::schema::schema_utils::CallToolError;
use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolResult, Implementation, InitializeResult, ListToolsRequest,
    ListToolsResult, RpcError, ServerCapabilities, ServerCapabilitiesTools, TextContent,
    LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{tool_box, McpServer, StdioTransport, TransportOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_RUN_LIMIT: u32 = 25;

// ========== Environment tools ==========

/// All configured environments with the active and default markers.
pub async fn list_environments(state: &AppState) -> AppResult<Value> {
    let configuration = state.manager.configuration();
    Ok(json!({
        "active": state.manager.active_name(),
        "default": configuration.default_name(),
        "source": state.manager.origin().to_string(),
        "environments": state.manager.list_environments(),
    }))
}

/// Make `name` the active environment.
pub async fn switch_environment(state: &AppState, name: &str) -> AppResult<Value> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_argument("name", "must not be empty"));
    }

    let outcome = state.manager.switch(name)?;
    let message = if outcome.previous == outcome.selection.name {
        format!("Environment '{name}' re-selected")
    } else {
        format!("Switched from '{}' to '{name}'", outcome.previous)
    };

    Ok(json!({
        "status": "success",
        "message": message,
        "previous": outcome.previous,
        "active": outcome.selection.name,
        "activated_at": outcome.selection.activated_at,
        "host": outcome.host,
        "description": outcome.description,
        "tags": outcome.tags,
    }))
}

pub async fn get_current_environment(state: &AppState) -> AppResult<Value> {
    Ok(serde_json::to_value(state.manager.get_current_environment())?)
}

/// Reload from disk. A rejected reload leaves the running configuration untouched.
pub async fn reload_environments(state: &AppState) -> AppResult<Value> {
    let manager = Arc::clone(&state.manager);
    let outcome = tokio::task::spawn_blocking(move || manager.reload()).await??;

    Ok(json!({
        "status": "success",
        "source": outcome.source,
        "environments": outcome.environments,
        "active": outcome.active,
        "active_reset": outcome.active_reset,
        "generation": outcome.generation,
    }))
}

// ========== Workspace tools ==========

pub async fn list_jobs(state: &AppState) -> AppResult<Value> {
    let response = state.workspace.list_jobs().await?;
    Ok(with_environment(&response, "jobs", summarize_jobs(&response.body)))
}

pub async fn get_job_details(state: &AppState, job_id: i64) -> AppResult<Value> {
    check_job_id(job_id)?;
    let response = state.workspace.get_job(job_id).await?;
    Ok(with_environment(&response, "job", summarize_job_details(&response.body)))
}

pub async fn get_job_status(state: &AppState, job_id: i64, limit: Option<u32>) -> AppResult<Value> {
    check_job_id(job_id)?;
    let limit = limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, 25);
    let response = state.workspace.list_job_runs(job_id, limit).await?;
    Ok(with_environment(&response, "runs", summarize_runs(&response.body)))
}

pub async fn list_clusters(state: &AppState) -> AppResult<Value> {
    let response = state.workspace.list_clusters().await?;
    Ok(with_environment(&response, "clusters", summarize_clusters(&response.body)))
}

pub async fn get_cluster_status(state: &AppState, cluster_id: &str) -> AppResult<Value> {
    let cluster_id = cluster_id.trim();
    if cluster_id.is_empty() {
        return Err(AppError::invalid_argument("cluster_id", "must not be empty"));
    }
    let response = state.workspace.get_cluster(cluster_id).await?;
    Ok(with_environment(&response, "cluster", summarize_cluster(&response.body)))
}

fn check_job_id(job_id: i64) -> AppResult<()> {
    if job_id <= 0 {
        return Err(AppError::invalid_argument("job_id", "must be a positive integer"));
    }
    Ok(())
}

fn with_environment(response: &WorkspaceResponse, key: &str, payload: Value) -> Value {
    let mut out = json!({
        "environment": response.environment,
        "host": response.host,
    });
    out[key] = payload;
    out
}

// ========== Response shaping ==========

fn field(value: &Value, pointer: &str) -> Value {
    value.pointer(pointer).cloned().unwrap_or(Value::Null)
}

pub fn summarize_jobs(body: &Value) -> Value {
    let jobs = body["jobs"].as_array().map(Vec::as_slice).unwrap_or_default();
    jobs.iter()
        .map(|job| {
            json!({
                "job_id": field(job, "/job_id"),
                "name": field(job, "/settings/name"),
                "creator": field(job, "/creator_user_name"),
            })
        })
        .collect()
}

pub fn summarize_job_details(body: &Value) -> Value {
    let tasks: Vec<Value> = body
        .pointer("/settings/tasks")
        .and_then(Value::as_array)
        .map(|tasks| {
            tasks
                .iter()
                .map(|task| {
                    let task_type = task
                        .as_object()
                        .and_then(|o| o.keys().find(|k| k.ends_with("_task")).cloned());
                    json!({
                        "task_key": field(task, "/task_key"),
                        "task_type": task_type,
                        "description": field(task, "/description"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "job_id": field(body, "/job_id"),
        "name": field(body, "/settings/name"),
        "creator": field(body, "/creator_user_name"),
        "created_time": field(body, "/created_time"),
        "tasks": tasks,
    })
}

pub fn summarize_runs(body: &Value) -> Value {
    let runs = body["runs"].as_array().map(Vec::as_slice).unwrap_or_default();
    runs.iter()
        .map(|run| {
            let start = run["start_time"].as_i64().filter(|t| *t > 0);
            let end = run["end_time"].as_i64().filter(|t| *t > 0);
            json!({
                "run_id": field(run, "/run_id"),
                "life_cycle_state": field(run, "/state/life_cycle_state"),
                "result_state": field(run, "/state/result_state"),
                "start_time": start,
                "end_time": end,
                "duration_ms": start.zip(end).map(|(s, e)| e - s),
            })
        })
        .collect()
}

pub fn summarize_clusters(body: &Value) -> Value {
    let clusters = body["clusters"].as_array().map(Vec::as_slice).unwrap_or_default();
    clusters
        .iter()
        .map(|c| {
            json!({
                "cluster_id": field(c, "/cluster_id"),
                "cluster_name": field(c, "/cluster_name"),
                "state": field(c, "/state"),
                "spark_version": field(c, "/spark_version"),
                "node_type_id": field(c, "/node_type_id"),
                "num_workers": field(c, "/num_workers"),
            })
        })
        .collect()
}

pub fn summarize_cluster(body: &Value) -> Value {
    json!({
        "cluster_id": field(body, "/cluster_id"),
        "cluster_name": field(body, "/cluster_name"),
        "state": field(body, "/state"),
        "state_message": field(body, "/state_message"),
        "spark_version": field(body, "/spark_version"),
        "node_type_id": field(body, "/node_type_id"),
        "driver_node_type_id": field(body, "/driver_node_type_id"),
        "num_workers": field(body, "/num_workers"),
        "autoscale": field(body, "/autoscale"),
        "autotermination_minutes": field(body, "/autotermination_minutes"),
        "single_user_name": field(body, "/single_user_name"),
        "start_time": field(body, "/start_time"),
    })
}

// ========== Tool definitions ==========

#[mcp_tool(
    name = "list_environments",
    description = "List all configured Databricks environments, marking the active and default ones.",
    read_only_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListEnvironmentsTool {}

#[mcp_tool(
    name = "switch_environment",
    description = "Switch the active Databricks environment. Subsequent tool calls use its credentials.",
    idempotent_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SwitchEnvironmentTool {
    /// Name of the environment to activate
    pub name: String,
}

#[mcp_tool(
    name = "get_current_environment",
    description = "Show the active environment: host, warehouse path, auth method and when it was selected.",
    read_only_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetCurrentEnvironmentTool {}

#[mcp_tool(
    name = "reload_environments",
    description = "Re-read the environment configuration file. An invalid file is rejected and the current configuration kept.",
    idempotent_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ReloadEnvironmentsTool {}

#[mcp_tool(
    name = "list_jobs",
    description = "List Databricks jobs in the active environment.",
    read_only_hint = true,
    open_world_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListJobsTool {}

#[mcp_tool(
    name = "get_job_details",
    description = "Get the definition of a Databricks job, including its tasks.",
    read_only_hint = true,
    open_world_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetJobDetailsTool {
    /// Numeric job ID
    pub job_id: i64,
}

#[mcp_tool(
    name = "get_job_status",
    description = "List recent runs of a Databricks job with their state and duration.",
    read_only_hint = true,
    open_world_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetJobStatusTool {
    /// Numeric job ID
    pub job_id: i64,
    /// Maximum number of runs to return (1-25, default 25)
    #[serde(default)]
    pub limit: Option<u32>,
}

#[mcp_tool(
    name = "list_clusters",
    description = "List Databricks clusters in the active environment.",
    read_only_hint = true,
    open_world_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListClustersTool {}

#[mcp_tool(
    name = "get_cluster_status",
    description = "Get the state and configuration of a Databricks cluster.",
    read_only_hint = true,
    open_world_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetClusterStatusTool {
    /// Cluster ID
    pub cluster_id: String,
}

tool_box!(
    DatabricksTools,
    [
        ListEnvironmentsTool,
        SwitchEnvironmentTool,
        GetCurrentEnvironmentTool,
        ReloadEnvironmentsTool,
        ListJobsTool,
        GetJobDetailsTool,
        GetJobStatusTool,
        ListClustersTool,
        GetClusterStatusTool
    ]
);

// ========== Handler ==========

pub struct DatabricksHandler {
    state: Arc<AppState>,
}

impl DatabricksHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run a decoded tool call and render its JSON result.
    pub async fn dispatch(&self, tool: DatabricksTools) -> AppResult<String> {
        let state = self.state.as_ref();
        let value = match tool {
            DatabricksTools::ListEnvironmentsTool(_) => list_environments(state).await?,
            DatabricksTools::SwitchEnvironmentTool(args) => {
                switch_environment(state, &args.name).await?
            }
            DatabricksTools::GetCurrentEnvironmentTool(_) => get_current_environment(state).await?,
            DatabricksTools::ReloadEnvironmentsTool(_) => reload_environments(state).await?,
            DatabricksTools::ListJobsTool(_) => list_jobs(state).await?,
            DatabricksTools::GetJobDetailsTool(args) => get_job_details(state, args.job_id).await?,
            DatabricksTools::GetJobStatusTool(args) => {
                get_job_status(state, args.job_id, args.limit).await?
            }
            DatabricksTools::ListClustersTool(_) => list_clusters(state).await?,
            DatabricksTools::GetClusterStatusTool(args) => {
                get_cluster_status(state, &args.cluster_id).await?
            }
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[async_trait]
impl ServerHandler for DatabricksHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: DatabricksTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<CallToolResult, CallToolError> {
        let name = request.params.name.clone();
        let tool = DatabricksTools::try_from(request.params).map_err(CallToolError::new)?;
        info!(tool = %name, environment = %self.state.manager.active_name(), "tool call");

        match self.dispatch(tool).await {
            Ok(text) => Ok(CallToolResult::text_content(vec![TextContent::from(text)])),
            Err(err) => {
                warn!(tool = %name, error = %err, "tool call failed");
                Err(CallToolError::new(err))
            }
        }
    }
}

pub fn server_details() -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: "databricks-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Databricks MCP Server".to_string()),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Databricks tools over multiple named environments. Call list_environments to see \
             them and switch_environment to change which workspace later calls target."
                .to_string(),
        ),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

/// Serve tools over stdio until the client disconnects.
pub async fn run_stdio_server(state: Arc<AppState>) -> SdkResult<()> {
    let transport = StdioTransport::new(TransportOptions::default())?;
    let handler = DatabricksHandler::new(state);
    let server = server_runtime::create_server(server_details(), transport, handler);
    info!("MCP server listening on stdio");
    server.start().await
}
