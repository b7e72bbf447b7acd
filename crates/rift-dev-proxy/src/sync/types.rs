//! Remote repository data model and on-disk cache shape.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Errors raised by one sync cycle.
///
/// None of these reach request handling: the sync client absorbs them and
/// falls back to the last persisted cache.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("remote request failed: {0}")]
    Fetch(String),
    #[error("remote service reported failure: {0}")]
    RemoteData(String),
    #[error("no cached repository {0}")]
    CacheMiss(RemoteId),
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },
}

impl SyncError {
    pub(crate) fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Identifier assigned by the remote service (repository or interface).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Num(u64),
    Str(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Num(n) => write!(f, "{n}"),
            RemoteId::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RemoteId {
    fn from(n: u64) -> Self {
        RemoteId::Num(n)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId::Str(s.to_string())
    }
}

/// Envelope of `GET /repository/get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryResponse {
    #[serde(default)]
    pub is_ok: Option<bool>,
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub data: Option<RepositoryGraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryGraph {
    pub id: RemoteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<RepositoryModule>,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryModule {
    #[serde(default)]
    pub interfaces: Vec<InterfaceDef>,
}

/// One method+URL definition inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDef {
    pub id: RemoteId,
    pub method: String,
    pub url: String,
    /// Date string or epoch milliseconds.
    #[serde(default)]
    pub updated_at: Value,
}

/// Reference to a collaborator repository. Extra fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorRef {
    pub id: RemoteId,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Cached state of one remote interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: RemoteId,
    pub path: String,
    /// Epoch milliseconds of the remote `updatedAt`.
    #[serde(rename = "syncTime")]
    pub sync_time: i64,
    /// Present only after a successful payload fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Ordered `"METHOD URL"` to [`CacheEntry`] mapping.
///
/// Serialized as a JSON object. Inserting an existing key replaces the value
/// in place, keeping the key's original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTable {
    entries: Vec<CacheEntry>,
    /// Route key to position in `entries`.
    index: HashMap<String, usize>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CacheEntry) {
        match self.index.get(&entry.path) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    /// Callers may update payloads but must not change `path`.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CacheEntry> {
        self.entries.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Merge `other` into this table; `other` wins on collisions.
    pub fn merge(&mut self, other: PathTable) {
        for entry in other.entries {
            self.insert(entry);
        }
    }

    /// Entries still waiting for a payload.
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|e| e.data.is_none()).count()
    }
}

impl FromIterator<CacheEntry> for PathTable {
    fn from_iter<I: IntoIterator<Item = CacheEntry>>(iter: I) -> Self {
        let mut table = PathTable::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

impl Serialize for PathTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.path, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PathTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PathTableVisitor;

        impl<'de> Visitor<'de> for PathTableVisitor {
            type Value = PathTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of route keys to cache entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PathTable, A::Error> {
                let mut table = PathTable::new();
                while let Some((key, mut entry)) = access.next_entry::<String, CacheEntry>()? {
                    entry.path = key;
                    table.insert(entry);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(PathTableVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub id: RemoteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorRef>,
}

/// On-disk cache of one repository: its own paths, never merged ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoCache {
    pub info: RepoInfo,
    pub paths: PathTable,
}
