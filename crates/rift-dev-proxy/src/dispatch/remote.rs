//! Merged remote route table, replaced wholesale on every sync.

use crate::pattern::{CompiledRoute, PatternOptions, RouteKey};
use crate::sync::{CacheEntry, PathTable};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

struct RemoteRoute {
    route: CompiledRoute,
    entry: CacheEntry,
}

/// Compiled snapshot of a merged path table.
#[derive(Default)]
pub struct RemoteRoutes {
    routes: Vec<RemoteRoute>,
}

impl RemoteRoutes {
    /// Compile every key of `paths`. Keys whose URL cannot be compiled are skipped.
    pub fn from_paths(paths: &PathTable) -> Self {
        let mut routes = Vec::with_capacity(paths.len());
        for entry in paths.iter() {
            let key = RouteKey::parse(&entry.path);
            let template = normalize_url(key.template());
            match CompiledRoute::compile_with_template(key, &template, PatternOptions::default())
            {
                Ok(route) => routes.push(RemoteRoute {
                    route,
                    entry: entry.clone(),
                }),
                Err(e) => warn!(path = %entry.path, error = %e, "Skipping remote route"),
            }
        }
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn position(&self, method: &str, path: &str) -> Option<usize> {
        self.routes
            .iter()
            .position(|r| r.route.match_request(method, path).is_some())
    }
}

/// Reduce an interface URL to a path template.
///
/// Absolute URLs keep only their path, the query is dropped and a leading `/`
/// is added when missing.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let without_origin = match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map(|j| &rest[j..]).unwrap_or("/")
        }
        None => url,
    };
    let path = without_origin
        .split(['?', '#'])
        .next()
        .unwrap_or(without_origin);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// A matched remote route, tied to its snapshot.
#[derive(Clone)]
pub struct RemoteMatch {
    table: Arc<RemoteRoutes>,
    index: usize,
}

impl RemoteMatch {
    pub fn entry(&self) -> &CacheEntry {
        &self.table.routes[self.index].entry
    }

    pub fn key(&self) -> &str {
        self.table.routes[self.index].route.key().as_str()
    }
}

impl std::fmt::Debug for RemoteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMatch").field("key", &self.key()).finish()
    }
}

/// Shared remote table. The sync task is the only writer.
#[derive(Default)]
pub struct RemoteTable {
    routes: RwLock<Arc<RemoteRoutes>>,
}

impl RemoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and swap in a new path table.
    pub fn publish(&self, paths: &PathTable) {
        let routes = RemoteRoutes::from_paths(paths);
        info!(routes = routes.len(), "Remote route table published");
        *self.routes.write() = Arc::new(routes);
    }

    pub fn snapshot(&self) -> Arc<RemoteRoutes> {
        self.routes.read().clone()
    }

    pub fn resolve(&self, method: &str, path: &str) -> Option<RemoteMatch> {
        let table = self.snapshot();
        let index = table.position(method, path)?;
        Some(RemoteMatch { table, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RemoteId;
    use serde_json::json;

    fn entry(path: &str, data: Option<serde_json::Value>) -> CacheEntry {
        CacheEntry {
            id: RemoteId::Num(1),
            path: path.to_string(),
            sync_time: 0,
            data,
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("/api/user"), "/api/user");
        assert_eq!(normalize_url("api/user"), "/api/user");
        assert_eq!(normalize_url("http://host:8080/api/user?x=1"), "/api/user");
        assert_eq!(normalize_url("https://host"), "/");
    }

    #[test]
    fn test_publish_and_resolve() {
        let table = RemoteTable::new();
        assert!(table.resolve("GET", "/api/user/1").is_none());

        let paths: PathTable = vec![
            entry("GET api/user/:id", Some(json!({"name": "a"}))),
            entry("POST /api/user", None),
        ]
        .into_iter()
        .collect();
        table.publish(&paths);

        let hit = table.resolve("GET", "/api/user/1").unwrap();
        assert_eq!(hit.key(), "GET api/user/:id");
        assert_eq!(hit.entry().data, Some(json!({"name": "a"})));
        assert!(table.resolve("POST", "/api/user/1").is_none());
        assert!(table.resolve("POST", "/API/USER").is_some());
    }

    #[test]
    fn test_old_snapshot_survives_publish() {
        let table = RemoteTable::new();
        table.publish(&vec![entry("GET /a", None)].into_iter().collect());
        let hit = table.resolve("GET", "/a").unwrap();
        table.publish(&PathTable::new());
        assert_eq!(hit.key(), "GET /a");
        assert!(table.resolve("GET", "/a").is_none());
    }
}
