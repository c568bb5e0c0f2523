use clap::Parser;
use databricks_mcp::config::{Settings, SettingsLoader};
use databricks_mcp::environment::{ConfigLoader, EnvironmentManager};
use databricks_mcp::logging::init_logging;
use databricks_mcp::mcp;
use databricks_mcp::state::AppState;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[cfg(feature = "hot-reload")]
use databricks_mcp::environment::{ConfigWatcher, WatchOptions};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "databricks_mcp_server",
    version,
    about = "MCP server for Databricks with switchable, hot-reloadable environments.",
    long_about = "Serves Databricks tools to MCP clients over stdio. Credentials come from named \
                  environments in environments.yaml (or a legacy .env file); the active environment \
                  can be switched at runtime and the file is reloaded when it changes."
)]
struct Args {
    /// Server settings file (TOML). Defaults to the standard resolution order.
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Environment configuration file (YAML or TOML).
    #[arg(long, value_name = "PATH")]
    environments: Option<PathBuf>,

    /// Legacy single-environment .env file used when the environments file is absent.
    #[arg(long, value_name = "PATH")]
    legacy_env: Option<PathBuf>,

    /// Do not watch the configuration files for changes.
    #[arg(long)]
    no_watch: bool,

    /// Log level: trace, debug, info, warn, error. RUST_LOG takes precedence.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Load and validate the configuration, print the environments, and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match resolve_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.server.log_level, settings.logging.format);

    match run(args, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server stopped");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let loader = SettingsLoader::resolve(args.settings.as_deref(), |settings| {
        if let Some(path) = &args.environments {
            settings.environments.file = path.clone();
        }
        if let Some(path) = &args.legacy_env {
            settings.environments.legacy_file = path.clone();
        }
        if let Some(level) = &args.log_level {
            settings.server.log_level = level.clone();
        }
        if args.no_watch {
            settings.watch.enabled = false;
        }
    })?;
    Ok(loader.into_settings())
}

async fn run(args: Args, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = env!("CARGO_PKG_VERSION"), "databricks-mcp starting");

    let loader = ConfigLoader::new(
        &settings.environments.file,
        &settings.environments.legacy_file,
    );
    let manager = Arc::new(EnvironmentManager::initialize(loader)?);

    if args.check {
        print_check(&manager);
        return Ok(());
    }

    #[cfg(feature = "hot-reload")]
    let _watcher = if settings.watch.enabled {
        let options = WatchOptions {
            debounce: settings.watch.debounce(),
            poll_interval: settings.watch.poll_interval(),
        };
        match ConfigWatcher::start(Arc::clone(&manager), options) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                error!(error = %err, "configuration watcher unavailable, hot reload disabled");
                None
            }
        }
    } else {
        info!("hot reload disabled");
        None
    };

    let state = Arc::new(AppState::new(manager, &settings)?);

    tokio::select! {
        result = mcp::run_stdio_server(state) => result?,
        _ = shutdown_signal() => {}
    }

    info!("databricks-mcp stopped");
    Ok(())
}

fn print_check(manager: &EnvironmentManager) {
    let configuration = manager.configuration();
    println!(
        "configuration OK: {} environment(s) from {} (default: {})",
        configuration.len(),
        manager.origin(),
        configuration.default_name()
    );
    for env in manager.list_environments() {
        let marker = if env.is_default { "*" } else { " " };
        println!(
            "{marker} {:<20} {:<45} {}",
            env.name,
            env.host,
            env.auth_method.as_str()
        );
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}
