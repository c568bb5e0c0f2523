//! Reload the environment configuration when its file changes on disk.
//!
//! The OS callback only enqueues a signal; a single consumer task debounces bursts
//! (editors often write a file several times per save) and calls
//! [`EnvironmentManager::reload`] once the file has been quiet for the debounce window.

use super::manager::EnvironmentManager;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("failed to watch '{}': {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("no watchable directory for '{}'", .path.display())]
    NoDirectory { path: PathBuf },
}

/// Watcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last event before a reload runs.
    pub debounce: Duration,
    /// Poll interval for backends that fall back to polling.
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Keeps the OS watcher and the reload task alive. Dropping it stops both.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    trigger: mpsc::Sender<()>,
    task: JoinHandle<()>,
    targets: Vec<PathBuf>,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl ConfigWatcher {
    /// Watch both the structured and the legacy file of `manager`'s loader.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        manager: Arc<EnvironmentManager>,
        options: WatchOptions,
    ) -> Result<Self, WatchError> {
        let loader = manager.loader();
        let targets: Vec<PathBuf> = [loader.structured_path(), loader.legacy_path()]
            .into_iter()
            .filter_map(|p| match resolve_target(p) {
                Ok(target) => Some(target),
                Err(err) => {
                    warn!(error = %err, "skipping configuration path");
                    None
                }
            })
            .collect();

        if targets.is_empty() {
            return Err(WatchError::NoDirectory {
                path: loader.structured_path().to_path_buf(),
            });
        }

        let (trigger, task) = spawn_reload_worker(manager, options.debounce);

        let event_tx = trigger.clone();
        let filter = targets.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) if is_config_event(&event, &filter) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "configuration file event");
                    // A full channel already has a reload pending.
                    let _ = event_tx.try_send(());
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "file watcher error"),
            },
            NotifyConfig::default().with_poll_interval(options.poll_interval),
        )
        .map_err(WatchError::Create)?;

        let dirs: BTreeSet<&Path> = targets.iter().filter_map(|t| t.parent()).collect();
        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Watch {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        info!(
            files = ?targets,
            debounce_ms = options.debounce.as_millis() as u64,
            "watching environment configuration for changes"
        );

        Ok(Self {
            _watcher: watcher,
            trigger,
            task,
            targets,
        })
    }

    /// Absolute paths being watched.
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Queue a reload as if the file had changed.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the single consumer that debounces signals and reloads `manager`.
///
/// Returns the sender used to signal a change and the task handle. The task ends
/// when every sender is dropped.
pub fn spawn_reload_worker(
    manager: Arc<EnvironmentManager>,
    debounce: Duration,
) -> (mpsc::Sender<()>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<()>(CHANNEL_CAPACITY);

    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // Wait until no further signal arrives within the debounce window.
            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            let manager = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || manager.reload()).await {
                // Failures are logged by the manager and the old configuration stays.
                Ok(_) => {}
                Err(err) => error!(error = %err, "configuration reload task failed"),
            }
        }
        debug!("configuration reload worker stopped");
    });

    (tx, task)
}

/// Absolute path of `path`, resolved through its (existing) parent directory.
fn resolve_target(path: &Path) -> Result<PathBuf, WatchError> {
    let file_name = path.file_name().ok_or_else(|| WatchError::NoDirectory {
        path: path.to_path_buf(),
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent.canonicalize().map_err(|_| WatchError::NoDirectory {
        path: path.to_path_buf(),
    })?;
    Ok(dir.join(file_name))
}

fn is_config_event(event: &Event, targets: &[PathBuf]) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| targets.contains(p))
}
