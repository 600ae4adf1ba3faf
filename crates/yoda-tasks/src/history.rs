//! Last-success timestamps for incremental tasks.
//!
//! The history lives in memory and can optionally be mirrored to a JSON file
//! so an incremental task still skips unchanged inputs after a restart.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

type Entries = BTreeMap<String, DateTime<Utc>>;

/// Per-task record of the last successful run.
#[derive(Debug, Default)]
pub struct RunHistory {
    entries: Mutex<Entries>,
    path: Option<PathBuf>,
}

impl RunHistory {
    /// History that is lost when the process exits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// History mirrored to `path`.
    ///
    /// An unreadable or malformed file is logged and treated as empty, which
    /// only costs one full rebuild.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Entries>(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed run history");
                Entries::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read run history");
                Entries::new()
            }
        };

        debug!(path = %path.display(), tasks = entries.len(), "run history loaded");
        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    /// File backing this history, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// When `task` last succeeded.
    pub fn last_success(&self, task: &str) -> Option<DateTime<Utc>> {
        self.lock().get(task).copied()
    }

    /// Record a successful run of `task` that started at `at`.
    pub fn record(&self, task: &str, at: DateTime<Utc>) {
        let mut entries = self.lock();
        entries.insert(task.to_string(), at);
        self.persist(&entries);
    }

    /// Forget `task`, so its next run starts from scratch.
    pub fn forget(&self, task: &str) {
        let mut entries = self.lock();
        if entries.remove(task).is_some() {
            self.persist(&entries);
        }
    }

    /// Forget every task.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &Entries) {
        let Some(path) = &self.path else {
            return;
        };

        let result = serde_json::to_string_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)
            });

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "could not persist run history");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_in_memory_record_and_forget() {
        let history = RunHistory::in_memory();
        let at = Utc.with_ymd_and_hms(2024, 1, 14, 10, 0, 0).unwrap();

        assert!(history.last_success("compile").is_none());
        history.record("compile", at);
        assert_eq!(history.last_success("compile"), Some(at));

        history.forget("compile");
        assert!(history.last_success("compile").is_none());
    }

    #[test]
    fn test_persistent_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/history.json");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        RunHistory::persistent(&path).record("compile", at);
        assert!(path.exists());

        let reloaded = RunHistory::persistent(&path);
        assert_eq!(reloaded.last_success("compile"), Some(at));
        assert_eq!(reloaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let history = RunHistory::persistent(&path);
        assert!(history.last_success("compile").is_none());
    }

    #[test]
    fn test_clear() {
        let history = RunHistory::in_memory();
        history.record("a", Utc::now());
        history.record("b", Utc::now());
        history.clear();
        assert!(history.last_success("a").is_none());
        assert!(history.last_success("b").is_none());
    }
}
