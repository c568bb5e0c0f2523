//! Tool functions driven through `AppState`, without a transport.

#![cfg(feature = "mcp")]

mod common;

use assert_json_diff::{assert_json_eq, assert_json_include};
use common::{environment_names, find_environment, ConfigDir, DEV_PROD_STAGING, DEV_STAGING};
use databricks_mcp::error::AppError;
use databricks_mcp::mcp::{self, DatabricksHandler, DatabricksTools, SwitchEnvironmentTool};
use databricks_mcp::service::WorkspaceError;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn list_environments_marks_active_and_default() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let listing = mcp::list_environments(&state).await.unwrap();
    assert_eq!(environment_names(&listing), vec!["dev", "prod", "staging"]);
    assert_eq!(listing["active"], "dev");
    assert_eq!(listing["default"], "dev");

    assert_json_include!(
        actual: find_environment(&listing, "dev"),
        expected: json!({
            "host": "dev.cloud.databricks.com",
            "auth_method": "token",
            "is_default": true,
            "is_active": true,
            "tags": ["dev", "sandbox"]
        })
    );
    assert_json_include!(
        actual: find_environment(&listing, "prod"),
        expected: json!({"auth_method": "profile", "is_default": false, "is_active": false})
    );
}

#[tokio::test]
async fn listing_never_contains_tokens() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let listing = mcp::list_environments(&state).await.unwrap().to_string();
    let current = mcp::get_current_environment(&state).await.unwrap().to_string();
    assert!(!listing.contains("dapi-dev-0123456789"));
    assert!(!current.contains("dapi-dev-0123456789"));
}

#[tokio::test]
async fn switch_then_current_reports_new_environment() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let switched = mcp::switch_environment(&state, "prod").await.unwrap();
    assert_json_include!(
        actual: switched,
        expected: json!({
            "status": "success",
            "message": "Switched from 'dev' to 'prod'",
            "previous": "dev",
            "active": "prod",
            "host": "prod.cloud.databricks.com",
            "description": "Production workspace"
        })
    );

    let current = mcp::get_current_environment(&state).await.unwrap();
    assert_json_include!(
        actual: current,
        expected: json!({
            "name": "prod",
            "host": "prod.cloud.databricks.com",
            "http_path": "/sql/1.0/warehouses/prod",
            "auth_method": "profile",
            "is_default": false
        })
    );
}

#[tokio::test]
async fn switch_to_active_reports_reselection() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let switched = mcp::switch_environment(&state, " dev ").await.unwrap();
    assert_eq!(switched["message"], "Environment 'dev' re-selected");
}

#[tokio::test]
async fn switch_rejects_blank_and_unknown_names() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let blank = mcp::switch_environment(&state, "   ").await.unwrap_err();
    assert!(matches!(blank, AppError::InvalidArgument { .. }));

    let unknown = mcp::switch_environment(&state, "qa").await.unwrap_err();
    assert_eq!(
        unknown.to_string(),
        "environment 'qa' not found. Available environments: dev, prod, staging"
    );
    assert_eq!(state.manager.active_name(), "dev");
}

#[tokio::test]
async fn reload_tool_reports_reset() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();
    mcp::switch_environment(&state, "prod").await.unwrap();

    config.write_environments(DEV_STAGING);
    let reloaded = mcp::reload_environments(&state).await.unwrap();
    assert_json_include!(
        actual: reloaded,
        expected: json!({
            "status": "success",
            "environments": 2,
            "active": "dev",
            "active_reset": true,
            "generation": 1
        })
    );
}

#[tokio::test(flavor = "current_thread")]
async fn reload_tool_runs_off_the_async_thread() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = Arc::new(config.state());

    // Reload and read concurrently on a single-threaded runtime; both complete.
    let reload = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { mcp::reload_environments(&state).await })
    };
    let current = mcp::get_current_environment(&state).await.unwrap();
    assert_eq!(current["name"], "dev");

    let reloaded = reload.await.unwrap().unwrap();
    assert_eq!(reloaded["generation"], 1);
    assert_eq!(state.manager.generation(), 1);
}

#[tokio::test]
async fn reload_tool_failure_keeps_configuration() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    config.write_environments("default: [");
    let err = mcp::reload_environments(&state).await.unwrap_err();
    assert!(err.to_string().starts_with("reload rejected, keeping current configuration"));

    let listing = mcp::list_environments(&state).await.unwrap();
    assert_eq!(environment_names(&listing).len(), 3);
}

#[tokio::test]
async fn profile_environment_without_cli_names_environment() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();
    mcp::switch_environment(&state, "staging").await.unwrap();

    let err = mcp::list_clusters(&state).await.unwrap_err();
    match &err {
        AppError::Workspace(WorkspaceError::CliNotFound { environment, profile, .. }) => {
            assert_eq!(environment, "staging");
            assert_eq!(profile, "staging-profile");
        }
        other => panic!("expected CliNotFound, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("Current environment: staging"), "{message}");
    assert!(message.contains("switch_environment"), "{message}");
}

#[tokio::test]
async fn unreachable_workspace_names_environment() {
    let config = ConfigDir::with_environments(
        r#"
default: local
environments:
  local:
    host: 127.0.0.1:9
    token: dapi-local-0000000000
    http_path: /sql/1.0/warehouses/local
"#,
    );
    let state = config.state();

    let err = mcp::list_jobs(&state).await.unwrap_err();
    assert!(matches!(err, AppError::Workspace(WorkspaceError::Request { .. })));
    let message = err.to_string();
    assert!(message.contains("Current environment: local"), "{message}");
    assert!(!message.contains("dapi-local-0000000000"), "{message}");
}

#[tokio::test]
async fn job_and_cluster_arguments_are_checked_before_any_call() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    assert!(matches!(
        mcp::get_job_details(&state, 0).await,
        Err(AppError::InvalidArgument { .. })
    ));
    assert!(matches!(
        mcp::get_job_status(&state, -4, None).await,
        Err(AppError::InvalidArgument { .. })
    ));
    assert!(matches!(
        mcp::get_cluster_status(&state, "  ").await,
        Err(AppError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn handler_dispatch_renders_json_text() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let handler = DatabricksHandler::new(Arc::new(config.state()));

    let text = handler
        .dispatch(DatabricksTools::SwitchEnvironmentTool(SwitchEnvironmentTool {
            name: "staging".to_string(),
        }))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["active"], "staging");
}

#[test]
fn tool_list_is_complete() {
    let mut names: Vec<String> = DatabricksTools::tools().into_iter().map(|t| t.name).collect();
    names.sort();
    assert_json_eq!(
        json!(names),
        json!([
            "get_cluster_status",
            "get_current_environment",
            "get_job_details",
            "get_job_status",
            "list_clusters",
            "list_environments",
            "list_jobs",
            "reload_environments",
            "switch_environment"
        ])
    );
}

#[test]
fn server_details_advertise_tools() {
    let details = mcp::server_details();
    assert_eq!(details.server_info.name, "databricks-mcp");
    assert!(details.capabilities.tools.is_some());
}

#[test]
fn tool_functions_run_on_a_plain_executor() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let state = config.state();

    let current = tokio_test::block_on(mcp::get_current_environment(&state)).unwrap();
    assert_eq!(current["name"], "dev");
}
