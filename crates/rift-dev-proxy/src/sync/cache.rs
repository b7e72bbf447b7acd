//! On-disk repository caches under `<mock root>/_cache/<id>.json`.

use super::types::{RemoteId, RepoCache, SyncError};
use crate::mock::CACHE_DIR_NAME;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes [`RepoCache`] files. Only the sync client uses this.
#[derive(Debug, Clone)]
pub struct SyncCache {
    dir: PathBuf,
}

impl SyncCache {
    /// Cache rooted in the reserved cache folder of `mock_root`.
    pub fn new(mock_root: &Path) -> Self {
        Self {
            dir: mock_root.join(CACHE_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &RemoteId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn load(&self, id: &RemoteId) -> Result<RepoCache, SyncError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SyncError::CacheMiss(id.clone()));
        }
        let text = fs::read_to_string(&path).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::decode(format!("cache file {}", path.display()), e))
    }

    /// Replace the cache file for `cache.info.id`.
    ///
    /// Written to a sibling temp file and renamed, so readers see either the
    /// old or the new content.
    pub fn store(&self, cache: &RepoCache) -> Result<PathBuf, SyncError> {
        fs::create_dir_all(&self.dir).map_err(|source| SyncError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
        cache
            .serialize(&mut ser)
            .map_err(|e| SyncError::decode(format!("repository {}", cache.info.id), e))?;

        let path = self.path_for(&cache.info.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &buf).map_err(|source| SyncError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), paths = cache.paths.len(), "Persisted repository cache");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{CacheEntry, PathTable, RepoInfo};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(id: u64) -> RepoCache {
        let paths: PathTable = vec![CacheEntry {
            id: RemoteId::Num(10),
            path: "GET /api/a".to_string(),
            sync_time: 1_600_000_000_000,
            data: Some(json!({"name|1-3": "x"})),
        }]
        .into_iter()
        .collect();
        RepoCache {
            info: RepoInfo {
                id: RemoteId::Num(id),
                name: "demo".to_string(),
                collaborators: vec![],
            },
            paths,
        }
    }

    #[test]
    fn test_missing_cache_is_cache_miss() {
        let dir = TempDir::new().unwrap();
        let cache = SyncCache::new(dir.path());
        let err = cache.load(&RemoteId::Num(1)).unwrap_err();
        assert!(matches!(err, SyncError::CacheMiss(RemoteId::Num(1))));
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = SyncCache::new(dir.path());
        let written = cache.store(&sample(5)).unwrap();

        assert_eq!(written, dir.path().join("_cache").join("5.json"));
        assert_eq!(cache.load(&RemoteId::Num(5)).unwrap(), sample(5));

        let text = std::fs::read_to_string(written).unwrap();
        assert!(text.contains("\n\t\"info\""), "cache is tab indented: {text}");
    }

    #[test]
    fn test_corrupt_cache_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let cache = SyncCache::new(dir.path());
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.path_for(&RemoteId::Num(3)), "{").unwrap();
        assert!(matches!(
            cache.load(&RemoteId::Num(3)).unwrap_err(),
            SyncError::Decode { .. }
        ));
    }
}
