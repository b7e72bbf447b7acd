//! Repository sync client.
//!
//! One sync cycle walks `Idle -> Authenticating -> FetchingRepository ->
//! Reconciling -> FetchingPayloads -> Persisting -> Done` for the root
//! repository, then for each collaborator (depth-limited, cycle-safe). Any
//! failure ends the cycle in `Degraded` and the last persisted caches are
//! served instead.

use super::api::RemoteApi;
use super::cache::SyncCache;
use super::progress::{LogProgress, ProgressCounter, ProgressSink};
use super::reconcile::reconcile;
use super::types::{PathTable, RemoteId, RepoCache, RepoInfo, SyncError};
use crate::metrics;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const PAYLOAD_PROGRESS_TITLE: &str = "Syncing remote interface mock data";

/// Per-repository sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Authenticating,
    FetchingRepository,
    Reconciling,
    FetchingPayloads,
    Persisting,
    Done,
    /// Served from the on-disk cache after a failure.
    Degraded,
}

/// How a sync cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Done,
    Degraded,
    /// Failed with nothing cached to fall back to.
    Empty,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Done => "done",
            SyncOutcome::Degraded => "degraded",
            SyncOutcome::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub paths: PathTable,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub repository_id: RemoteId,
    /// Fetch and cache payloads. When false, matched routes are proxied live.
    pub cache_payloads: bool,
    /// How many levels of collaborators are merged. 0 disables merging.
    pub collaborator_depth: usize,
}

impl SyncOptions {
    pub fn new(repository_id: RemoteId) -> Self {
        Self {
            repository_id,
            cache_payloads: true,
            collaborator_depth: 1,
        }
    }
}

pub struct RepositorySyncClient {
    api: Arc<dyn RemoteApi>,
    cache: SyncCache,
    options: SyncOptions,
    progress: Arc<dyn ProgressSink>,
    token: tokio::sync::Mutex<Option<String>>,
    states: Mutex<HashMap<RemoteId, SyncState>>,
}

impl RepositorySyncClient {
    pub fn new(api: Arc<dyn RemoteApi>, cache: SyncCache, options: SyncOptions) -> Self {
        Self {
            api,
            cache,
            options,
            progress: Arc::new(LogProgress),
            token: tokio::sync::Mutex::new(None),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn state(&self, id: &RemoteId) -> SyncState {
        self.states.lock().get(id).copied().unwrap_or(SyncState::Idle)
    }

    fn set_state(&self, id: &RemoteId, state: SyncState) {
        debug!(repository = %id, ?state, "Sync state");
        self.states.lock().insert(id.clone(), state);
    }

    /// Bearer token, fetched once and kept for the process lifetime.
    pub async fn authenticate(&self) -> Result<String, SyncError> {
        let mut token = self.token.lock().await;
        if let Some(t) = token.as_ref() {
            return Ok(t.clone());
        }
        let fresh = self.api.fetch_token().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    /// Fetch payloads for every entry without data, reporting progress.
    ///
    /// A failed fetch leaves that entry without data; the rest continue.
    pub async fn fetch_payloads(&self, table: &mut PathTable) {
        let total = table.len();
        let mut counter = ProgressCounter::start(self.progress.as_ref(), PAYLOAD_PROGRESS_TITLE, total);

        for entry in table.iter_mut() {
            if entry.data.is_some() {
                counter.tick(&format!("skip {}", entry.path));
                continue;
            }
            counter.tick(&format!("fetch {}", entry.path));
            match self.api.fetch_payload(&entry.id).await {
                Ok(data) => {
                    metrics::record_payload_fetch(true);
                    entry.data = Some(data);
                }
                Err(e) => {
                    metrics::record_payload_fetch(false);
                    warn!(path = %entry.path, error = %e, "Failed to fetch interface payload");
                }
            }
        }

        counter.done();
    }

    /// Write `paths` as the cache of repository `info.id`.
    pub fn persist(&self, info: RepoInfo, paths: PathTable) -> Result<(), SyncError> {
        self.cache.store(&RepoCache { info, paths })?;
        Ok(())
    }

    /// Sync one repository and, within `depth`, its collaborators.
    fn sync_repository<'a>(
        &'a self,
        id: RemoteId,
        depth: usize,
        visited: &'a mut HashSet<RemoteId>,
    ) -> BoxFuture<'a, Result<PathTable, SyncError>> {
        Box::pin(async move {
            visited.insert(id.clone());

            self.set_state(&id, SyncState::Authenticating);
            let token = self.authenticate().await?;

            self.set_state(&id, SyncState::FetchingRepository);
            let graph = match self.api.fetch_repository(&id, &token).await {
                Ok(graph) => graph,
                Err(e) => {
                    if matches!(e, SyncError::Auth(_)) {
                        *self.token.lock().await = None;
                    }
                    return Err(e);
                }
            };

            self.set_state(&id, SyncState::Reconciling);
            let previous = match self.cache.load(&id) {
                Ok(cache) => cache.paths,
                Err(SyncError::CacheMiss(_)) => PathTable::new(),
                Err(e) => {
                    warn!(repository = %id, error = %e, "Ignoring unreadable repository cache");
                    PathTable::new()
                }
            };
            let mut paths = reconcile(&graph, &previous)?;
            debug!(
                repository = %id,
                interfaces = paths.len(),
                pending = paths.pending(),
                "Reconciled repository"
            );

            if self.options.cache_payloads {
                self.set_state(&id, SyncState::FetchingPayloads);
                self.fetch_payloads(&mut paths).await;
            }

            self.set_state(&id, SyncState::Persisting);
            let info = RepoInfo {
                id: graph.id.clone(),
                name: graph.name.clone(),
                collaborators: graph.collaborators.clone(),
            };
            // Cache file is keyed by the requested id.
            self.persist(RepoInfo { id: id.clone(), ..info }, paths.clone())?;
            self.set_state(&id, SyncState::Done);

            let mut merged = paths;
            if depth > 0 {
                for collaborator in &graph.collaborators {
                    if visited.contains(&collaborator.id) {
                        continue;
                    }
                    let cid = collaborator.id.clone();
                    match self.sync_repository(cid.clone(), depth - 1, visited).await {
                        Ok(table) => merged.merge(table),
                        Err(e) => {
                            warn!(
                                repository = %cid,
                                error = %e,
                                "Collaborator sync failed, using its local cache"
                            );
                            self.set_state(&cid, SyncState::Degraded);
                            match self.load_cached(&cid, depth - 1, visited) {
                                Ok(table) => merged.merge(table),
                                Err(e) => {
                                    warn!(repository = %cid, error = %e, "No usable collaborator cache")
                                }
                            }
                        }
                    }
                }
            }

            Ok(merged)
        })
    }

    /// Rebuild a merged table from on-disk caches only.
    fn load_cached(
        &self,
        id: &RemoteId,
        depth: usize,
        visited: &mut HashSet<RemoteId>,
    ) -> Result<PathTable, SyncError> {
        visited.insert(id.clone());
        let cache = self.cache.load(id)?;
        let mut merged = cache.paths;

        if depth > 0 {
            for collaborator in &cache.info.collaborators {
                if visited.contains(&collaborator.id) {
                    continue;
                }
                match self.load_cached(&collaborator.id, depth - 1, visited) {
                    Ok(table) => merged.merge(table),
                    Err(e) => {
                        debug!(repository = %collaborator.id, error = %e, "Skipping collaborator cache")
                    }
                }
            }
        }

        Ok(merged)
    }

    /// Run one full cycle for the configured repository.
    ///
    /// Never fails: on any error the last persisted caches are returned, or
    /// an empty table when there are none.
    pub async fn sync(&self) -> SyncReport {
        let id = self.options.repository_id.clone();
        let depth = self.options.collaborator_depth;

        let mut visited = HashSet::new();
        let report = match self.sync_repository(id.clone(), depth, &mut visited).await {
            Ok(paths) => {
                info!(repository = %id, routes = paths.len(), "Remote mock data ready");
                SyncReport {
                    paths,
                    outcome: SyncOutcome::Done,
                }
            }
            Err(e) => {
                warn!(
                    repository = %id,
                    error = %e,
                    "Remote repository sync failed, falling back to local cache"
                );
                self.set_state(&id, SyncState::Degraded);
                match self.load_cached(&id, depth, &mut HashSet::new()) {
                    Ok(paths) => {
                        info!(repository = %id, routes = paths.len(), "Serving cached remote mock data");
                        SyncReport {
                            paths,
                            outcome: SyncOutcome::Degraded,
                        }
                    }
                    Err(SyncError::CacheMiss(_)) => {
                        info!(repository = %id, "No cache file, skipping remote mock data");
                        SyncReport {
                            paths: PathTable::new(),
                            outcome: SyncOutcome::Empty,
                        }
                    }
                    Err(e) => {
                        warn!(repository = %id, error = %e, "Failed to read repository cache");
                        SyncReport {
                            paths: PathTable::new(),
                            outcome: SyncOutcome::Empty,
                        }
                    }
                }
            }
        };

        metrics::record_sync(report.outcome.as_str());
        report
    }

    /// Sync now and, when `refresh` is set, again on every interval tick.
    /// Each result is handed to `publish`.
    pub async fn run<F>(self: Arc<Self>, refresh: Option<Duration>, publish: F)
    where
        F: Fn(PathTable) + Send + Sync + 'static,
    {
        publish(self.sync().await.paths);

        let Some(period) = refresh else {
            return;
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            debug!("Refreshing remote repository");
            publish(self.sync().await.paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{CacheEntry, CollaboratorRef, InterfaceDef, RepositoryGraph, RepositoryModule};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct FakeApi {
        repos: HashMap<RemoteId, RepositoryGraph>,
        payloads: HashMap<RemoteId, Value>,
        token_calls: AtomicUsize,
        payload_calls: AtomicUsize,
        fail_repository: bool,
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        async fn fetch_token(&self) -> Result<String, SyncError> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Ok("t".to_string())
        }

        async fn fetch_repository(
            &self,
            id: &RemoteId,
            _token: &str,
        ) -> Result<RepositoryGraph, SyncError> {
            if self.fail_repository {
                return Err(SyncError::Fetch("connection refused".to_string()));
            }
            self.repos
                .get(id)
                .cloned()
                .ok_or_else(|| SyncError::RemoteData(format!("no repository {id}")))
        }

        async fn fetch_payload(&self, interface_id: &RemoteId) -> Result<Value, SyncError> {
            self.payload_calls.fetch_add(1, Ordering::SeqCst);
            self.payloads
                .get(interface_id)
                .cloned()
                .ok_or_else(|| SyncError::Fetch("missing payload".to_string()))
        }
    }

    fn repo(id: u64, interfaces: &[(u64, &str, &str)], collaborators: &[u64]) -> RepositoryGraph {
        RepositoryGraph {
            id: RemoteId::Num(id),
            name: format!("repo-{id}"),
            modules: vec![RepositoryModule {
                interfaces: interfaces
                    .iter()
                    .map(|(itf, method, url)| InterfaceDef {
                        id: RemoteId::Num(*itf),
                        method: method.to_string(),
                        url: url.to_string(),
                        updated_at: json!("2021-05-01T00:00:00.000Z"),
                    })
                    .collect(),
            }],
            collaborators: collaborators
                .iter()
                .map(|c| CollaboratorRef {
                    id: RemoteId::Num(*c),
                    extra: Default::default(),
                })
                .collect(),
        }
    }

    fn client(dir: &TempDir, api: Arc<FakeApi>) -> RepositorySyncClient {
        RepositorySyncClient::new(api, SyncCache::new(dir.path()), SyncOptions::new(RemoteId::Num(1)))
    }

    #[tokio::test]
    async fn test_sync_fetches_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(RemoteId::Num(1), repo(1, &[(10, "GET", "/a")], &[]));
        api.payloads.insert(RemoteId::Num(10), json!({"v": 1}));
        let api = Arc::new(api);
        let client = client(&dir, api.clone());

        let report = client.sync().await;
        assert_eq!(report.outcome, SyncOutcome::Done);
        assert_eq!(report.paths.get("GET /a").unwrap().data, Some(json!({"v": 1})));
        assert_eq!(client.state(&RemoteId::Num(1)), SyncState::Done);
        assert!(dir.path().join("_cache/1.json").exists());

        // Second cycle reuses token and cached payloads.
        client.sync().await;
        assert_eq!(api.token_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.payload_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_payload_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(
            RemoteId::Num(1),
            repo(1, &[(10, "GET", "/a"), (11, "GET", "/b")], &[]),
        );
        api.payloads.insert(RemoteId::Num(11), json!("b"));
        let client = client(&dir, Arc::new(api));

        let report = client.sync().await;
        assert_eq!(report.outcome, SyncOutcome::Done);
        assert!(report.paths.get("GET /a").unwrap().data.is_none());
        assert_eq!(report.paths.get("GET /b").unwrap().data, Some(json!("b")));
    }

    #[tokio::test]
    async fn test_cache_disabled_skips_payloads() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(RemoteId::Num(1), repo(1, &[(10, "GET", "/a")], &[]));
        let api = Arc::new(api);
        let mut options = SyncOptions::new(RemoteId::Num(1));
        options.cache_payloads = false;
        let client = RepositorySyncClient::new(api.clone(), SyncCache::new(dir.path()), options);

        let report = client.sync().await;
        assert_eq!(report.paths.len(), 1);
        assert_eq!(api.payload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collaborator_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(RemoteId::Num(1), repo(1, &[(10, "GET", "/a")], &[2]));
        api.repos.insert(RemoteId::Num(2), repo(2, &[(20, "GET", "/b")], &[1]));
        let mut options = SyncOptions::new(RemoteId::Num(1));
        options.collaborator_depth = 5;
        options.cache_payloads = false;
        let client = RepositorySyncClient::new(Arc::new(api), SyncCache::new(dir.path()), options);

        let report = client.sync().await;
        let keys: Vec<_> = report.paths.keys().collect();
        assert_eq!(keys, vec!["GET /a", "GET /b"]);
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_empty() {
        let dir = TempDir::new().unwrap();
        let api = FakeApi {
            fail_repository: true,
            ..Default::default()
        };
        let client = client(&dir, Arc::new(api));

        let report = client.sync().await;
        assert_eq!(report.outcome, SyncOutcome::Empty);
        assert!(report.paths.is_empty());
        assert_eq!(client.state(&RemoteId::Num(1)), SyncState::Degraded);
    }

    #[tokio::test]
    async fn test_live_sync_collaborator_wins_shared_key() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(
            RemoteId::Num(1),
            repo(1, &[(10, "GET", "/shared"), (11, "GET", "/root")], &[2]),
        );
        api.repos
            .insert(RemoteId::Num(2), repo(2, &[(20, "GET", "/shared")], &[]));
        api.payloads.insert(RemoteId::Num(10), json!("root"));
        api.payloads.insert(RemoteId::Num(11), json!("root only"));
        api.payloads.insert(RemoteId::Num(20), json!("collab"));

        let report = client(&dir, Arc::new(api)).sync().await;
        assert_eq!(report.outcome, SyncOutcome::Done);
        assert_eq!(report.paths.len(), 2);
        let shared = report.paths.get("GET /shared").unwrap();
        assert_eq!(shared.id, RemoteId::Num(20));
        assert_eq!(shared.data, Some(json!("collab")));
        assert_eq!(
            report.paths.get("GET /root").unwrap().data,
            Some(json!("root only"))
        );
        assert!(dir.path().join("_cache/2.json").exists());
    }

    #[tokio::test]
    async fn test_fallback_merges_collaborator_caches() {
        let dir = TempDir::new().unwrap();
        let cache = SyncCache::new(dir.path());
        let entry = |id: u64, path: &str| CacheEntry {
            id: RemoteId::Num(id),
            path: path.to_string(),
            sync_time: 1,
            data: Some(json!(id)),
        };
        cache
            .store(&RepoCache {
                info: RepoInfo {
                    id: RemoteId::Num(1),
                    name: "root".to_string(),
                    collaborators: vec![CollaboratorRef {
                        id: RemoteId::Num(2),
                        extra: Default::default(),
                    }],
                },
                paths: vec![entry(10, "GET /shared"), entry(11, "GET /root")]
                    .into_iter()
                    .collect(),
            })
            .unwrap();
        cache
            .store(&RepoCache {
                info: RepoInfo {
                    id: RemoteId::Num(2),
                    name: "collab".to_string(),
                    collaborators: vec![],
                },
                paths: vec![entry(20, "GET /shared")].into_iter().collect(),
            })
            .unwrap();

        let api = FakeApi {
            fail_repository: true,
            ..Default::default()
        };
        let report = client(&dir, Arc::new(api)).sync().await;
        assert_eq!(report.outcome, SyncOutcome::Degraded);
        assert_eq!(report.paths.len(), 2);
        assert_eq!(report.paths.get("GET /shared").unwrap().data, Some(json!(20)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_degraded_fallback_serves_cache_and_logs() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(RemoteId::Num(1), repo(1, &[(10, "GET", "/a")], &[]));
        api.payloads.insert(RemoteId::Num(10), json!({"v": 1}));
        client(&dir, Arc::new(api)).sync().await;

        let offline = FakeApi {
            fail_repository: true,
            ..Default::default()
        };
        let report = client(&dir, Arc::new(offline)).sync().await;
        assert_eq!(report.outcome, SyncOutcome::Degraded);
        assert_eq!(report.paths.get("GET /a").unwrap().data, Some(json!({"v": 1})));
        assert!(logs_contain("falling back to local cache"));
    }

    #[tokio::test]
    async fn test_run_publishes_once_without_refresh() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.repos.insert(RemoteId::Num(1), repo(1, &[(10, "GET", "/a")], &[]));
        api.payloads.insert(RemoteId::Num(10), json!(1));
        let client = Arc::new(client(&dir, Arc::new(api)));

        let published = Arc::new(AtomicUsize::new(0));
        let counter = published.clone();
        client
            .run(None, move |paths| {
                assert_eq!(paths.len(), 1);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(published.load(Ordering::SeqCst), 1);
    }
}
