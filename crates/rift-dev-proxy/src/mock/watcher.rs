//! File watch bridge driving mock hot reload.

use super::loader::CACHE_DIR_NAME;
use super::MockStore;
use crate::metrics;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error, warn};

/// Kind of file-system change as far as reloading is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Other,
}

impl From<&EventKind> for WatchEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => WatchEventKind::Add,
            EventKind::Modify(_) => WatchEventKind::Change,
            _ => WatchEventKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// Only add/change events outside the cache directory trigger a reload.
pub fn should_reload(event: &WatchEvent) -> bool {
    matches!(event.kind, WatchEventKind::Add | WatchEventKind::Change)
        && !is_cache_path(&event.path)
}

fn is_cache_path(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == CACHE_DIR_NAME))
}

/// Recursive watcher over a mock directory.
///
/// The `notify` watcher stops when this value is dropped.
pub struct MockWatcher {
    _watcher: RecommendedWatcher,
    rx: UnboundedReceiver<WatchEvent>,
}

impl MockWatcher {
    pub fn new(root: &Path) -> Result<Self> {
        let (tx, rx) = unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let kind = WatchEventKind::from(&event.kind);
                    for path in event.paths {
                        let _ = tx.send(WatchEvent { kind, path });
                    }
                }
                Err(e) => warn!(error = %e, "Mock watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create mock file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch mock directory: {}", root.display()))?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Reload `store` for every relevant event until the watcher closes.
    ///
    /// Events are handled one at a time, so a change arriving mid-reload
    /// simply triggers another full reload afterwards.
    pub async fn run_reload_loop(mut self, store: Arc<MockStore>) {
        while let Some(event) = self.next_event().await {
            if !should_reload(&event) {
                debug!(path = %event.path.display(), kind = ?event.kind, "Ignoring watch event");
                continue;
            }

            let store = store.clone();
            let changed = event.path.clone();
            let result =
                tokio::task::spawn_blocking(move || store.reload(Some(&changed)).map(|_| ()))
                    .await;

            match result {
                Ok(Ok(())) => metrics::record_mock_reload(true),
                Ok(Err(_)) => metrics::record_mock_reload(false),
                Err(e) => {
                    metrics::record_mock_reload(false);
                    error!(error = %e, "Mock reload task failed");
                }
            }
        }
        debug!("Mock watcher closed");
    }
}
