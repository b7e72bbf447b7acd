//! Hot-reloadable mock table.

use super::entry::MockEntry;
use super::loader::{self, MockRoute, MockTable};
use super::MockError;
use crate::pattern::ResolvedParams;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A matched mock route, tied to the table snapshot it came from.
#[derive(Debug, Clone)]
pub struct MockMatch {
    table: Arc<MockTable>,
    index: usize,
    pub params: ResolvedParams,
}

impl MockMatch {
    fn route(&self) -> &MockRoute {
        // Index was produced by `position` on this same snapshot.
        &self.table[self.index]
    }

    pub fn key(&self) -> &str {
        self.route().key()
    }

    pub fn entry(&self) -> &MockEntry {
        &self.route().entry
    }
}

/// Owns the current mock table and replaces it wholesale on reload.
///
/// Readers take an `Arc` snapshot, so a request never observes a partially
/// built table. Reloads are serialised by `reload_lock`.
pub struct MockStore {
    root: PathBuf,
    table: RwLock<Arc<MockTable>>,
    reload_lock: Mutex<()>,
}

impl MockStore {
    /// Load every mock under `root`. Any failure is fatal.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, MockError> {
        let root = root.into();
        let table = loader::load(&root)?;
        info!(root = %root.display(), routes = table.len(), "Mock table loaded");
        Ok(Self {
            root,
            table: RwLock::new(Arc::new(table)),
            reload_lock: Mutex::new(()),
        })
    }

    /// Store over an already built table, with no directory behind it.
    pub fn from_table(root: impl Into<PathBuf>, table: MockTable) -> Self {
        Self {
            root: root.into(),
            table: RwLock::new(Arc::new(table)),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the table from disk.
    ///
    /// On failure the previous table stays in place and the error is returned.
    pub fn reload(&self, changed: Option<&Path>) -> Result<usize, MockError> {
        let _guard = self.reload_lock.lock();
        match loader::load(&self.root) {
            Ok(table) => {
                let routes = table.len();
                *self.table.write() = Arc::new(table);
                info!(
                    changed = ?changed.map(|p| p.display().to_string()),
                    routes,
                    "Hot mock reload succeeded"
                );
                Ok(routes)
            }
            Err(e) => {
                warn!(
                    changed = ?changed.map(|p| p.display().to_string()),
                    error = %e,
                    "Hot mock reload failed, keeping previous table"
                );
                Err(e)
            }
        }
    }

    /// Current table snapshot.
    pub fn snapshot(&self) -> Arc<MockTable> {
        self.table.read().clone()
    }

    /// First route, in load order, matching the request.
    pub fn resolve(&self, method: &str, path: &str) -> Option<MockMatch> {
        let table = self.snapshot();
        let (index, params) = table.position(method, path)?;
        Some(MockMatch {
            table,
            index,
            params,
        })
    }

    /// Whether some non-OPTIONS route exists for `path`.
    pub fn has_other_verb_route(&self, path: &str) -> bool {
        self.snapshot().has_other_verb_route(path)
    }
}
