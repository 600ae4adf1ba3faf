//! Remote and local source fetching.
//!
//! A sources file lists content and assets that live outside the site tree.
//! Each descriptor is refreshed into the site before content is compiled,
//! skipping sources that have not changed since the local copy was written.

use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use reqwest::{
    Client, StatusCode,
    header::{IF_MODIFIED_SINCE, LAST_MODIFIED},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("yoda/", env!("CARGO_PKG_VERSION"));

/// HTTP date format used by `If-Modified-Since` and `Last-Modified`.
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Sources file could not be read.
    #[error("failed to read sources file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sources file is not a JSON array of descriptors.
    #[error("invalid sources file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {locator} failed: {source}")]
    Http {
        locator: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{locator}: HTTP {status}")]
    Status { locator: String, status: StatusCode },

    /// Local copy or destination write failed.
    #[error("failed to fetch {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    /// Destination is absolute or leaves the base directory.
    #[error("destination {0} must stay inside the site directory")]
    InvalidDestination(PathBuf),

    /// Some descriptors failed; the others were fetched.
    #[error("{} source(s) failed: {}", .0.len(), describe_failures(.0))]
    Partial(Vec<FetchFailure>),
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// What a fetched source is used as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Content,
    Asset,
}

/// One entry of the sources file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// `http(s)://` URL, or a path relative to the site directory.
    pub locator: String,

    /// Where the source is written, relative to the site directory.
    pub destination: PathBuf,

    #[serde(default)]
    pub kind: SourceKind,
}

impl SourceDescriptor {
    pub fn is_remote(&self) -> bool {
        self.locator.starts_with("http://") || self.locator.starts_with("https://")
    }
}

/// Parsed sources file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcesFile {
    pub sources: Vec<SourceDescriptor>,
}

impl SourcesFile {
    /// Load a sources file. An absent file lists nothing.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no sources file, nothing to fetch");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(FetchError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| FetchError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A descriptor that could not be fetched.
#[derive(Debug, Error)]
#[error("#{index} {locator}: {error}")]
pub struct FetchFailure {
    /// Position in the sources file.
    pub index: usize,
    pub locator: String,
    #[source]
    pub error: FetchError,
}

fn describe_failures(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|f| f.locator.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What happened to one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Updated,
    Unchanged,
}

/// Outcome of fetching every descriptor.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Destinations written, relative to the site directory.
    pub updated: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    /// Fail when any descriptor failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(FetchError::Partial(self.failures))
        }
    }

    /// Whether a content source was written.
    pub fn content_changed(&self, descriptors: &[SourceDescriptor]) -> bool {
        descriptors
            .iter()
            .any(|d| d.kind == SourceKind::Content && self.updated.contains(&d.destination))
    }
}

/// Refreshes source descriptors into a site directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base: PathBuf,
}

impl Fetcher {
    /// Create a fetcher writing under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self::with_client(base, client))
    }

    pub fn with_client(base: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    /// Fetch every descriptor concurrently.
    ///
    /// A failing descriptor is recorded and does not affect the others.
    pub async fn fetch_all(&self, descriptors: &[SourceDescriptor]) -> FetchReport {
        let handles: Vec<_> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                let fetcher = self.clone();
                tokio::spawn(async move { fetcher.fetch_one(&descriptor).await })
            })
            .collect();

        let mut report = FetchReport::default();
        for (index, (descriptor, handle)) in descriptors.iter().zip(handles).enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Io {
                    locator: descriptor.locator.clone(),
                    source: std::io::Error::other(e),
                }),
            };

            match result {
                Ok(FetchStatus::Updated) => report.updated.push(descriptor.destination.clone()),
                Ok(FetchStatus::Unchanged) => {
                    report.unchanged.push(descriptor.destination.clone());
                }
                Err(error) => {
                    warn!(index, locator = %descriptor.locator, error = %error, "fetch failed");
                    report.failures.push(FetchFailure {
                        index,
                        locator: descriptor.locator.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            failed = report.failures.len(),
            "sources fetched"
        );
        report
    }

    /// Fetch a single descriptor.
    pub async fn fetch_one(&self, descriptor: &SourceDescriptor) -> Result<FetchStatus> {
        let destination = self.resolve_destination(&descriptor.destination)?;
        let local_modified = modified_time(&destination).await;

        if descriptor.is_remote() {
            self.fetch_remote(&descriptor.locator, &destination, local_modified)
                .await
        } else {
            self.fetch_local(&descriptor.locator, &destination, local_modified)
                .await
        }
    }

    fn resolve_destination(&self, destination: &Path) -> Result<PathBuf> {
        let escapes = destination
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || destination.as_os_str().is_empty() {
            return Err(FetchError::InvalidDestination(destination.to_path_buf()));
        }
        Ok(self.base.join(destination))
    }

    async fn fetch_remote(
        &self,
        locator: &str,
        destination: &Path,
        local_modified: Option<DateTime<Utc>>,
    ) -> Result<FetchStatus> {
        let http_err = |source| FetchError::Http {
            locator: locator.to_string(),
            source,
        };

        let mut request = self.client.get(locator);
        if let Some(modified) = local_modified {
            request = request.header(IF_MODIFIED_SINCE, modified.format(HTTP_DATE).to_string());
        }

        let response = request.send().await.map_err(http_err)?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(locator, "not modified");
            return Ok(FetchStatus::Unchanged);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.to_string(),
                status,
            });
        }

        let remote_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc));
        if let (Some(remote), Some(local)) = (remote_modified, local_modified)
            && remote <= local
        {
            debug!(locator, "local copy is current");
            return Ok(FetchStatus::Unchanged);
        }

        let body = response.bytes().await.map_err(http_err)?;
        write_destination(destination, &body)
            .await
            .map_err(|source| FetchError::Io {
                locator: locator.to_string(),
                source,
            })?;

        debug!(locator, dest = %destination.display(), bytes = body.len(), "fetched");
        Ok(FetchStatus::Updated)
    }

    async fn fetch_local(
        &self,
        locator: &str,
        destination: &Path,
        local_modified: Option<DateTime<Utc>>,
    ) -> Result<FetchStatus> {
        let io_err = |source| FetchError::Io {
            locator: locator.to_string(),
            source,
        };

        let path = self.base.join(locator.strip_prefix("file://").unwrap_or(locator));
        let source_modified = tokio::fs::metadata(&path)
            .await
            .map_err(io_err)?
            .modified()
            .map(DateTime::<Utc>::from)
            .ok();

        if let (Some(source), Some(local)) = (source_modified, local_modified)
            && source <= local
        {
            debug!(locator, "local copy is current");
            return Ok(FetchStatus::Unchanged);
        }

        let bytes = tokio::fs::read(&path).await.map_err(io_err)?;
        write_destination(destination, &bytes)
            .await
            .map_err(io_err)?;

        debug!(locator, dest = %destination.display(), "copied");
        Ok(FetchStatus::Updated)
    }
}

async fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

async fn write_destination(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || crate::stages::write_atomic(&path, &bytes))
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(locator: &str, destination: &str) -> SourceDescriptor {
        SourceDescriptor {
            locator: locator.to_string(),
            destination: PathBuf::from(destination),
            kind: SourceKind::Content,
        }
    }

    #[test]
    fn test_load_sources_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"[
                {"locator": "https://example.com/a.md", "destination": "content/a.md"},
                {"locator": "shared/logo.png", "destination": "assets/logo.png", "kind": "asset"}
            ]"#,
        )
        .unwrap();

        let file = SourcesFile::load(&path).unwrap();

        assert_eq!(file.sources.len(), 2);
        assert!(file.sources[0].is_remote());
        assert_eq!(file.sources[0].kind, SourceKind::Content);
        assert_eq!(file.sources[1].kind, SourceKind::Asset);
        assert!(!file.sources[1].is_remote());
    }

    #[test]
    fn test_missing_sources_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = SourcesFile::load(&dir.path().join("sources.json")).unwrap();
        assert!(file.is_empty());
    }

    #[test]
    fn test_invalid_sources_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, r#"{"locator": "x"}"#).unwrap();
        assert!(matches!(
            SourcesFile::load(&path),
            Err(FetchError::Parse { .. })
        ));
    }

    #[test]
    fn test_destination_must_stay_inside_base() {
        let fetcher = Fetcher::with_client("/site", Client::new());
        assert!(fetcher.resolve_destination(Path::new("content/a.md")).is_ok());
        assert!(matches!(
            fetcher.resolve_destination(Path::new("../escape.md")),
            Err(FetchError::InvalidDestination(_))
        ));
        assert!(matches!(
            fetcher.resolve_destination(Path::new("/etc/passwd")),
            Err(FetchError::InvalidDestination(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_local_copy_then_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shared")).unwrap();
        std::fs::write(dir.path().join("shared/post.md"), "# Shared").unwrap();

        let fetcher = Fetcher::with_client(dir.path(), Client::new());
        let d = descriptor("shared/post.md", "content/post.md");

        assert_eq!(fetcher.fetch_one(&d).await.unwrap(), FetchStatus::Updated);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("content/post.md")).unwrap(),
            "# Shared"
        );
        assert!(modified_time(&dir.path().join("content/post.md")).await.is_some());

        assert_eq!(fetcher.fetch_one(&d).await.unwrap(), FetchStatus::Unchanged);
    }

    #[tokio::test]
    async fn test_fetch_local_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::with_client(dir.path(), Client::new());
        let err = fetcher
            .fetch_one(&descriptor("missing.md", "content/missing.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
