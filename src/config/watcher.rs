//! Policy hot reload.
//!
//! # Data Flow
//! ```text
//! notify event on the config's directory
//!     → filtered to the config file itself
//!     → load_config (parse + validate)
//!     → skipped if identical to the last accepted config
//!     → sent to the server's reload loop
//! ```
//!
//! The parent directory is watched rather than the file, so editors that
//! save by rename still trigger a reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ShieldConfig;

/// Monitors the configuration file and emits validated replacements.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ShieldConfig>,
    last: Arc<Mutex<Option<ShieldConfig>>>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ShieldConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let last = load_config(path).ok();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                last: Arc::new(Mutex::new(last)),
            },
            update_rx,
        )
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for as long as updates are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let handler = ReloadHandler {
            path: self.path.clone(),
            tx: self.update_tx,
            last: self.last,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => handler.on_event(&event),
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

struct ReloadHandler {
    path: PathBuf,
    tx: mpsc::UnboundedSender<ShieldConfig>,
    last: Arc<Mutex<Option<ShieldConfig>>>,
}

impl ReloadHandler {
    fn on_event(&self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let file_name = self.path.file_name();
        if !event.paths.iter().any(|p| p.file_name() == file_name) {
            return;
        }
        self.reload();
    }

    fn reload(&self) {
        let new_config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Rejected config reload, keeping current policies"
                );
                return;
            }
        };

        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.as_ref() == Some(&new_config) {
            tracing::debug!(path = ?self.path, "Config unchanged, reload skipped");
            return;
        }

        tracing::info!(path = ?self.path, routes = new_config.routes.len(), "Config reloaded");
        *last = Some(new_config.clone());
        let _ = self.tx.send(new_config);
    }
}
