//! Global site metadata.
//!
//! The store is loaded once per build from an optional JSON object file and
//! handed to the transform pipeline as an immutable snapshot, so documents
//! rendered concurrently never observe a half-updated mapping.

use std::{path::Path, sync::Arc};

use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Ordered mapping of metadata keys to values.
pub type Metadata = serde_json::Map<String, Value>;

/// Process-wide metadata mapping.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    data: Arc<Metadata>,
}

impl MetadataStore {
    /// Create a store with initial content.
    pub fn new(initial: Metadata) -> Self {
        Self {
            data: Arc::new(initial),
        }
    }

    /// Replace the store content with the JSON object at `path`.
    ///
    /// Returns `Ok(false)` and leaves the store untouched when the file does
    /// not exist. A malformed file is an error and also leaves the store
    /// untouched.
    pub fn load(&mut self, path: &Path) -> Result<bool> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no metadata file");
                return Ok(false);
            }
            Err(e) => return Err(CoreError::metadata(path, e.to_string())),
        };

        let value: Value =
            serde_json::from_str(&content).map_err(|e| CoreError::metadata(path, e.to_string()))?;

        let Value::Object(map) = value else {
            return Err(CoreError::metadata(path, "expected a JSON object"));
        };

        debug!(path = %path.display(), keys = map.len(), "metadata loaded");
        self.data = Arc::new(map);
        Ok(true)
    }

    /// Immutable view for one build run.
    pub fn snapshot(&self) -> Arc<Metadata> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Overlay `overrides` on `base` key by key; `overrides` wins on collision.
///
/// Keys keep the order of `base`, with new keys appended in `overrides` order.
pub fn overlay(base: &Metadata, overrides: &Metadata) -> Metadata {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Resolve a dotted key path (`site.title`) against a mapping.
pub fn lookup<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a Value> {
    if let Some(value) = metadata.get(key) {
        return Some(value);
    }

    let mut parts = key.split('.');
    let mut current = metadata.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a metadata value as plain text.
///
/// Strings are used verbatim, arrays are joined with `", "`, null is empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_load_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, r#"{"title": "Site", "author": "Ada"}"#).unwrap();

        let mut store = MetadataStore::new(map(json!({"old": 1})));
        assert!(store.load(&path).unwrap());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("title"), Some(&json!("Site")));
        assert!(snapshot.get("old").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_absent_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(map(json!({"title": "Default"})));

        let loaded = store.load(&dir.path().join("missing.json")).unwrap();

        assert!(!loaded);
        assert_eq!(store.snapshot().get("title"), Some(&json!("Default")));
    }

    #[test]
    fn test_malformed_file_is_error_and_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut store = MetadataStore::default();
        let err = store.load(&path).unwrap_err();

        assert!(matches!(err, CoreError::Metadata { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_object_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let err = MetadataStore::default().load(&path).unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_snapshot_is_stable_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, r#"{"v": 2}"#).unwrap();

        let mut store = MetadataStore::new(map(json!({"v": 1})));
        let before = store.snapshot();
        store.load(&path).unwrap();

        assert_eq!(before.get("v"), Some(&json!(1)));
        assert_eq!(store.snapshot().get("v"), Some(&json!(2)));
    }

    #[test]
    fn test_overlay_frontmatter_wins() {
        let global = map(json!({"title": "Site", "lang": "en"}));
        let page = map(json!({"title": "Page", "draft": false}));

        let merged = overlay(&global, &page);

        assert_eq!(merged.get("title"), Some(&json!("Page")));
        assert_eq!(merged.get("lang"), Some(&json!("en")));
        assert_eq!(merged.get("draft"), Some(&json!(false)));
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, vec!["title", "lang", "draft"]);
    }

    #[test]
    fn test_lookup_dotted() {
        let data = map(json!({
            "site": {"title": "Yoda", "links": ["a", "b"]},
            "plain.key": "direct"
        }));

        assert_eq!(lookup(&data, "site.title"), Some(&json!("Yoda")));
        assert_eq!(lookup(&data, "site.links.1"), Some(&json!("b")));
        assert_eq!(lookup(&data, "plain.key"), Some(&json!("direct")));
        assert!(lookup(&data, "site.missing").is_none());
        assert!(lookup(&data, "missing").is_none());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("x")), "x");
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&json!(true)), "true");
        assert_eq!(display_value(&json!(null)), "");
        assert_eq!(display_value(&json!(["a", "b"])), "a, b");
    }
}
