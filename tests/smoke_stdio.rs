//! Process-level smoke tests for the server binary.

#![cfg(feature = "mcp")]

mod common;

use common::{ConfigDir, DEV_PROD_STAGING};
use std::process::{Command, Output, Stdio};

fn run_binary(config: &ConfigDir, extra: &[&str]) -> Output {
    run_binary_with_settings(config, "[watch]\nenabled = false\n", extra)
}

fn run_binary_with_settings(config: &ConfigDir, settings_toml: &str, extra: &[&str]) -> Output {
    let settings = config.path().join("settings.toml");
    std::fs::write(&settings, settings_toml).unwrap();

    Command::new(env!("CARGO_BIN_EXE_databricks_mcp_server"))
        .arg("--settings")
        .arg(&settings)
        .arg("--environments")
        .arg(config.environments_path())
        .arg("--legacy-env")
        .arg(config.legacy_path())
        .args(extra)
        .stdin(Stdio::null())
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to start binary")
}

#[test]
fn check_lists_environments_and_exits() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let output = run_binary(&config, &["--check"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("configuration OK: 3 environment(s)"), "{stdout}");
    assert!(stdout.contains("* dev"), "{stdout}");
    assert!(stdout.contains("prod.cloud.databricks.com"), "{stdout}");
    assert!(!stdout.contains("dapi-dev-0123456789"), "token leaked: {stdout}");
}

#[test]
fn missing_configuration_exits_non_zero() {
    let config = ConfigDir::new();
    let output = run_binary(&config, &["--check"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("environments.yaml"), "{stderr}");
}

#[test]
fn invalid_configuration_exits_non_zero() {
    let config = ConfigDir::with_environments(&DEV_PROD_STAGING.replace("default: dev", "default: qa"));
    let output = run_binary(&config, &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("qa"), "{stderr}");
}

#[test]
fn tokens_never_reach_the_logs() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let output = run_binary(&config, &["--check", "--log-level", "trace"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");
    assert!(!stderr.contains("dapi-dev-0123456789"), "token leaked: {stderr}");
}

#[test]
fn command_line_level_replaces_invalid_file_level() {
    let config = ConfigDir::with_environments(DEV_PROD_STAGING);
    let settings = "[server]\nlog_level = \"verbose\"\n\n[watch]\nenabled = false\n";

    let rejected = run_binary_with_settings(&config, settings, &["--check"]);
    assert!(!rejected.status.success());
    let stderr = String::from_utf8_lossy(&rejected.stderr);
    assert!(stderr.contains("server.log_level"), "{stderr}");

    let accepted = run_binary_with_settings(&config, settings, &["--check", "--log-level", "info"]);
    assert!(
        accepted.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&accepted.stderr)
    );
}
