//! Mock directory discovery and table construction.

use super::entry::MockEntry;
use super::script::{entry_from_value, load_script_file};
use super::MockError;
use crate::pattern::{CompiledRoute, PatternOptions, ResolvedParams};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Reserved directory name holding sync caches; never loaded as mocks.
pub const CACHE_DIR_NAME: &str = "_cache";

/// One compiled mock route.
#[derive(Debug, Clone)]
pub struct MockRoute {
    pub route: CompiledRoute,
    pub entry: MockEntry,
    /// File the current value came from.
    pub source: PathBuf,
}

impl MockRoute {
    pub fn key(&self) -> &str {
        self.route.key().as_str()
    }
}

/// Ordered `"METHOD path"` to entry mapping.
///
/// Iteration order is first-insertion order. Re-inserting an existing key
/// replaces its value but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    routes: Vec<MockRoute>,
    /// Route key to position in `routes`.
    index: HashMap<String, usize>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, entry: MockEntry, source: &Path) -> Result<(), MockError> {
        if let Some(&i) = self.index.get(key) {
            let existing = &mut self.routes[i];
            existing.entry = entry;
            existing.source = source.to_path_buf();
            return Ok(());
        }

        let route = CompiledRoute::compile(key, PatternOptions::default()).map_err(|source_err| {
            MockError::Route {
                path: source.to_path_buf(),
                source: source_err,
            }
        })?;
        self.index.insert(key.to_string(), self.routes.len());
        self.routes.push(MockRoute {
            route,
            entry,
            source: source.to_path_buf(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MockRoute> {
        self.routes.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.key())
    }

    pub fn get(&self, key: &str) -> Option<&MockEntry> {
        self.index.get(key).map(|&i| &self.routes[i].entry)
    }

    /// First route, in table order, that matches the request.
    pub fn resolve(&self, method: &str, path: &str) -> Option<(&MockRoute, ResolvedParams)> {
        self.position(method, path)
            .map(|(i, params)| (&self.routes[i], params))
    }

    pub(crate) fn position(&self, method: &str, path: &str) -> Option<(usize, ResolvedParams)> {
        self.routes
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.route.match_request(method, path).map(|p| (i, p)))
    }

    /// Whether a route declared for a non-OPTIONS verb matches `path`.
    pub fn has_other_verb_route(&self, path: &str) -> bool {
        self.routes
            .iter()
            .any(|r| r.route.key().has_non_options_verb() && r.route.matches_path(path))
    }
}

impl std::ops::Index<usize> for MockTable {
    type Output = MockRoute;

    fn index(&self, index: usize) -> &MockRoute {
        &self.routes[index]
    }
}

impl PartialEq for MockTable {
    fn eq(&self, other: &Self) -> bool {
        self.routes.len() == other.routes.len()
            && self
                .routes
                .iter()
                .zip(&other.routes)
                .all(|(a, b)| a.key() == b.key() && a.entry == b.entry)
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name == CACHE_DIR_NAME || name.starts_with('.')
}

/// List mock files under `root` in directory traversal order.
///
/// No sorting is applied: the platform's enumeration order decides which
/// file wins when two define the same key.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, MockError> {
    if !root.is_dir() {
        return Err(MockError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e))
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Evaluate a single mock file into ordered `(key, entry)` pairs.
pub fn load_file(path: &Path) -> Result<Vec<(String, MockEntry)>, MockError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let source = std::fs::read_to_string(path).map_err(|source| MockError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = match extension.as_deref() {
        Some("rhai") => return load_script_file(path, &source),
        Some("json") => serde_json::from_str(&source).map_err(|e| MockError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        Some("yaml") | Some("yml") => {
            if source.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_yaml::from_str(&source).map_err(|e| MockError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
        }
        _ => return Err(MockError::UnsupportedFile(path.to_path_buf())),
    };

    let Value::Object(map) = value else {
        return Err(MockError::NotAMapping {
            path: path.to_path_buf(),
        });
    };

    let origin = path.display().to_string();
    map.into_iter()
        .map(|(key, value)| {
            let entry = entry_from_value(&format!("{origin}#{key}"), value)?;
            Ok((key, entry))
        })
        .collect()
}

/// Build a fresh table from every mock file under `root`.
pub fn load(root: &Path) -> Result<MockTable, MockError> {
    let files = discover(root)?;
    let mut table = MockTable::new();

    for file in &files {
        let entries = load_file(file)?;
        debug!(file = %file.display(), entries = entries.len(), "Loaded mock file");
        for (key, entry) in entries {
            table.insert(&key, entry, file)?;
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_table_reinsert_keeps_position() {
        let source = Path::new("a.json");
        let mut table = MockTable::new();
        table.insert("GET /a", MockEntry::Static(json!(1)), source).unwrap();
        table.insert("GET /b", MockEntry::Static(json!(2)), source).unwrap();
        table
            .insert("GET /a", MockEntry::Static(json!(3)), Path::new("b.json"))
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["GET /a", "GET /b"]);
        assert_eq!(table.get("GET /a"), Some(&MockEntry::Static(json!(3))));
        assert_eq!(table[0].source, PathBuf::from("b.json"));
        assert!(table.get("GET /c").is_none());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = load(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, MockError::MissingRoot(_)));
    }

    #[test]
    fn test_discover_skips_cache_and_hidden() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", "{}");
        write(dir.path(), "nested/b.yaml", "{}");
        write(dir.path(), "_cache/42.json", "{}");
        write(dir.path(), ".DS_Store", "junk");
        write(dir.path(), ".hidden/c.json", "{}");

        let mut names: Vec<_> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![PathBuf::from("a.json"), PathBuf::from("nested/b.yaml")]
        );
    }

    #[test]
    fn test_unsupported_extension_fails_fast() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes.txt", "hello");
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, MockError::UnsupportedFile(_)));
    }

    #[test]
    fn test_non_mapping_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "list.json", "[1, 2]");
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, MockError::NotAMapping { .. }));
    }

    #[test]
    fn test_json_key_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "api.json",
            r#"{"GET /z": 1, "GET /a": 2, "POST /m": 3}"#,
        );
        let table = load(dir.path()).unwrap();
        let keys: Vec<_> = table.keys().collect();
        assert_eq!(keys, vec!["GET /z", "GET /a", "POST /m"]);
    }

    #[test]
    fn test_yaml_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "api.yml", "\"GET /user\":\n  name: alice\n");
        let table = load(dir.path()).unwrap();
        assert_eq!(
            table.get("GET /user"),
            Some(&MockEntry::Static(json!({"name": "alice"})))
        );
    }

    #[test]
    fn test_reinsert_keeps_position_and_takes_new_value() {
        let mut table = MockTable::new();
        let a = Path::new("a.json");
        let b = Path::new("b.json");
        table.insert("GET /x", MockEntry::Static(json!(1)), a).unwrap();
        table.insert("GET /y", MockEntry::Static(json!(2)), a).unwrap();
        table.insert("GET /x", MockEntry::Static(json!(3)), b).unwrap();

        let keys: Vec<_> = table.keys().collect();
        assert_eq!(keys, vec!["GET /x", "GET /y"]);
        assert_eq!(table.get("GET /x"), Some(&MockEntry::Static(json!(3))));
        assert_eq!(table.iter().next().unwrap().source, b);
    }

    #[test]
    fn test_resolve_first_match_in_table_order() {
        let mut table = MockTable::new();
        let src = Path::new("m.json");
        table
            .insert("GET /users/:id", MockEntry::Static(json!("param")), src)
            .unwrap();
        table
            .insert("GET /users/me", MockEntry::Static(json!("me")), src)
            .unwrap();

        let (route, params) = table.resolve("GET", "/users/me").unwrap();
        assert_eq!(route.key(), "GET /users/:id");
        assert!(params.contains_key("id"));
        assert!(table.resolve("POST", "/users/me").is_none());
    }

    #[test]
    fn test_other_verb_route_detection() {
        let mut table = MockTable::new();
        let src = Path::new("m.json");
        table
            .insert("POST /api/x", MockEntry::Static(json!(1)), src)
            .unwrap();
        assert!(table.has_other_verb_route("/api/x"));
        assert!(!table.has_other_verb_route("/api/y"));
    }
}
