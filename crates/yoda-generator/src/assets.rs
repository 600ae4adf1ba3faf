//! Static file copying.
//!
//! Copies a directory tree (assets, stylesheets, scripts, raw HTML content)
//! into the build tree, optionally restricted to files changed since the last
//! successful copy.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Asset copy errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("failed to copy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source tree could not be walked.
    #[error("failed to read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Files handled by one copy run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Copied files, relative to the source root.
    pub copied: Vec<PathBuf>,
    /// Files skipped because they did not change.
    pub unchanged: usize,
}

/// Mirrors a source directory into a destination directory.
#[derive(Debug, Clone)]
pub struct CopyTree {
    source_dir: PathBuf,
    dest_dir: PathBuf,
    extensions: Option<Vec<String>>,
}

impl CopyTree {
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            extensions: None,
        }
    }

    /// Only copy files with one of these extensions.
    #[must_use]
    pub fn only_extensions<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Copy every matching file, or only those modified after `since`.
    ///
    /// Hidden files and directories are skipped. A missing source directory
    /// copies nothing.
    pub fn run(&self, since: Option<DateTime<Utc>>) -> Result<CopyReport> {
        let mut report = CopyReport::default();

        if !self.source_dir.is_dir() {
            debug!(
                source = %self.source_dir.display(),
                "source directory does not exist, skipping"
            );
            return Ok(report);
        }

        let walker = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
            });

        for entry in walker {
            let entry = entry.map_err(|source| AssetError::Walk {
                path: self.source_dir.clone(),
                source,
            })?;
            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.source_dir) else {
                continue;
            };

            if let Some(since) = since {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from);
                if modified.is_some_and(|m| m <= since) {
                    report.unchanged += 1;
                    continue;
                }
            }

            let dest = self.dest_dir.join(relative);
            copy_file(entry.path(), &dest)?;
            debug!(src = %entry.path().display(), dest = %dest.display(), "copied file");
            report.copied.push(relative.to_path_buf());
        }

        info!(
            source = %self.source_dir.display(),
            copied = report.copied.len(),
            unchanged = report.unchanged,
            "files copied"
        );
        Ok(report)
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(extensions) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Copy a single file, creating parent directories.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    let io_err = |source| AssetError::Io {
        path: dest.to_path_buf(),
        source,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::copy(source, dest).map_err(io_err)?;
    Ok(())
}
