//! Content transform pipeline.
//!
//! Discovers content documents, rejects destination collisions, then pushes
//! every selected document through the stages in parallel.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};
use yoda_core::{Config, CoreError, Document, DocumentStatus, Metadata, destination_for};
use yoda_parser::MarkupRenderer;

use crate::{
    stages::{
        DraftFilter, Flow, FrontmatterStage, InterpolateStage, MetadataStage, RenderStage, Stage,
        StageError, TemplateStage, WriteStage,
    },
    template::TemplateRegistry,
};

/// Content files copied verbatim into the build tree. A document rendering
/// to the same destination as one of them is a collision.
pub const RAW_HTML_EXTENSIONS: [&str; 2] = ["html", "htm"];

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The content tree could not be walked.
    #[error("failed to read content directory {path}: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// At least one document failed; the rest were processed.
    #[error("{} document(s) failed: {}", .0.len(), describe_failures(.0))]
    DocumentsFailed(Vec<DocumentFailure>),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A document that did not make it to the build tree.
#[derive(Debug, Error)]
#[error("{}: {error}", .path.display())]
pub struct DocumentFailure {
    /// Source path relative to the content root.
    pub path: PathBuf,
    #[source]
    pub error: StageError,
}

fn describe_failures(failures: &[DocumentFailure]) -> String {
    failures
        .iter()
        .map(|f| f.path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Documents written, by source path.
    pub rendered: Vec<PathBuf>,
    /// Documents filtered out as drafts.
    pub drafts: Vec<PathBuf>,
    /// Previously written pages removed because their document is now a draft,
    /// relative to the build root.
    pub retracted: Vec<PathBuf>,
    /// Documents skipped because they did not change since the last run.
    pub unchanged: usize,
    /// Byte-identical documents dropped in favour of another source.
    pub duplicates: Vec<PathBuf>,
    pub failures: Vec<DocumentFailure>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Fail when any document failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PipelineError::DocumentsFailed(self.failures))
        }
    }
}

/// A discovered content file.
#[derive(Debug, Clone)]
struct Source {
    /// Relative to the content root.
    path: PathBuf,
    modified: Option<DateTime<Utc>>,
}

/// Everything found under the content root.
#[derive(Debug, Default)]
struct Discovered {
    documents: Vec<Source>,
    /// Raw files that keep their relative path in the build tree.
    passthrough: BTreeSet<PathBuf>,
}

enum Outcome {
    Rendered(PathBuf),
    Draft {
        source: PathBuf,
        retracted: Option<PathBuf>,
    },
    Failed(DocumentFailure),
}

/// Ordered stages applied to every content document.
#[derive(Debug)]
pub struct Pipeline {
    content_dir: PathBuf,
    extensions: Vec<String>,
    passthrough: Vec<String>,
    pretty_urls: bool,
    /// Where stale pages of filtered documents are removed from.
    build_dir: Option<PathBuf>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Create a pipeline without stages.
    pub fn new(
        content_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
        pretty_urls: bool,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            extensions,
            passthrough: Vec::new(),
            pretty_urls,
            build_dir: None,
            stages: Vec::new(),
        }
    }

    /// The standard stage sequence for a site.
    ///
    /// `live_reload` is inserted into every page when set.
    pub fn standard(
        config: &Config,
        snapshot: Arc<Metadata>,
        renderer: Arc<dyn MarkupRenderer>,
        templates: Arc<TemplateRegistry>,
        live_reload: Option<&str>,
    ) -> Self {
        let mut template_stage = TemplateStage::new(templates, &config.build.default_template);
        if let Some(script) = live_reload {
            template_stage = template_stage.with_live_reload(script);
        }

        Self::new(
            &config.paths.content,
            config.build.content_extensions.clone(),
            config.build.pretty_urls,
        )
        .with_passthrough(RAW_HTML_EXTENSIONS)
        .retracting_from(&config.paths.build)
        .with_stage(FrontmatterStage)
        .with_stage(MetadataStage::new(snapshot))
        .with_stage(DraftFilter::new(config.build.drafts))
        .with_stage(InterpolateStage)
        .with_stage(RenderStage::new(renderer))
        .with_stage(template_stage)
        .with_stage(WriteStage::new(&config.paths.build))
    }

    /// Treat files with these extensions as raw output that documents must
    /// not overwrite.
    #[must_use]
    pub fn with_passthrough<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.passthrough = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Remove the existing page of every filtered document from `build_dir`.
    #[must_use]
    pub fn retracting_from(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(build_dir.into());
        self
    }

    /// Append a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Content files relative to the content root, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .sources()?
            .documents
            .into_iter()
            .map(|s| s.path)
            .collect())
    }

    fn sources(&self) -> Result<Discovered> {
        let mut discovered = Discovered::default();
        if !self.content_dir.is_dir() {
            debug!(dir = %self.content_dir.display(), "content directory does not exist");
            return Ok(discovered);
        }

        let walker = WalkDir::new(&self.content_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|source| PipelineError::Discover {
                path: self.content_dir.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.content_dir) else {
                continue;
            };

            if !has_extension(entry.path(), &self.extensions) {
                if has_extension(entry.path(), &self.passthrough) {
                    discovered.passthrough.insert(relative.to_path_buf());
                }
                continue;
            }

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);
            discovered.documents.push(Source {
                path: relative.to_path_buf(),
                modified,
            });
        }

        discovered.documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(discovered)
    }

    /// Process content documents.
    ///
    /// With `since`, only documents modified strictly after it are read.
    /// Failed documents are collected in the report; use
    /// [`PipelineReport::into_result`] to turn them into an error.
    pub fn run(&self, since: Option<DateTime<Utc>>) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut report = PipelineReport::default();

        let Discovered {
            documents,
            passthrough,
        } = self.sources()?;
        let total = documents.len();
        let (sources, duplicates, collisions) = self.resolve_collisions(documents, &passthrough);
        report.duplicates = duplicates;
        report.failures = collisions;

        let (selected, unchanged): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .partition(|s| is_newer(s.modified, since));
        report.unchanged = unchanged.len();

        info!(
            total,
            selected = selected.len(),
            unchanged = report.unchanged,
            "processing content"
        );

        let outcomes: Vec<Outcome> = selected
            .par_iter()
            .map(|source| self.process(source))
            .collect();

        for outcome in outcomes {
            match outcome {
                Outcome::Rendered(path) => report.rendered.push(path),
                Outcome::Draft { source, retracted } => {
                    report.drafts.push(source);
                    report.retracted.extend(retracted);
                }
                Outcome::Failed(failure) => {
                    warn!(
                        source = %failure.path.display(),
                        error = %failure.error,
                        "document failed"
                    );
                    report.failures.push(failure);
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            rendered = report.rendered.len(),
            drafts = report.drafts.len(),
            retracted = report.retracted.len(),
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "content processed"
        );
        Ok(report)
    }

    /// Split sources sharing a destination.
    ///
    /// Byte-identical duplicates keep the lexicographically first source;
    /// anything else fails every document involved. A document landing on a
    /// raw passthrough file always fails, so the raw file is left alone.
    fn resolve_collisions(
        &self,
        sources: Vec<Source>,
        passthrough: &BTreeSet<PathBuf>,
    ) -> (Vec<Source>, Vec<PathBuf>, Vec<DocumentFailure>) {
        let mut by_destination: BTreeMap<PathBuf, Vec<Source>> = BTreeMap::new();
        for source in sources {
            by_destination
                .entry(destination_for(&source.path, self.pretty_urls))
                .or_default()
                .push(source);
        }

        let mut kept = Vec::new();
        let mut duplicates = Vec::new();
        let mut failures = Vec::new();

        for (destination, mut group) in by_destination {
            if passthrough.contains(&destination) {
                for source in group {
                    failures.push(DocumentFailure {
                        error: StageError::Core(CoreError::DestinationCollision {
                            path: destination.clone(),
                            first: destination.clone(),
                            second: source.path.clone(),
                        }),
                        path: source.path,
                    });
                }
                continue;
            }

            if group.len() == 1 {
                kept.append(&mut group);
                continue;
            }

            let contents: Vec<_> = group
                .iter()
                .map(|s| fs::read(self.content_dir.join(&s.path)).ok())
                .collect();
            let identical = contents[0].is_some() && contents.iter().all(|c| *c == contents[0]);

            let first = group.remove(0);
            if identical {
                for other in group {
                    debug!(
                        kept = %first.path.display(),
                        dropped = %other.path.display(),
                        "dropping identical duplicate"
                    );
                    duplicates.push(other.path);
                }
                kept.push(first);
                continue;
            }

            let second = group[0].path.clone();
            for source in std::iter::once(first.clone()).chain(group) {
                failures.push(DocumentFailure {
                    error: StageError::Core(CoreError::DestinationCollision {
                        path: destination.clone(),
                        first: first.path.clone(),
                        second: second.clone(),
                    }),
                    path: source.path,
                });
            }
        }

        kept.sort_by(|a, b| a.path.cmp(&b.path));
        (kept, duplicates, failures)
    }

    fn process(&self, source: &Source) -> Outcome {
        let mut doc = match Document::read(&self.content_dir, &source.path, self.pretty_urls) {
            Ok(doc) => doc,
            Err(e) => {
                return Outcome::Failed(DocumentFailure {
                    path: source.path.clone(),
                    error: StageError::Core(CoreError::Io(e)),
                });
            }
        };

        for stage in &self.stages {
            match stage.process(&mut doc) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Filtered) => return self.filtered(doc),
                Err(error) => {
                    doc.status = DocumentStatus::Failed;
                    return Outcome::Failed(DocumentFailure {
                        path: doc.source,
                        error,
                    });
                }
            }
        }

        Outcome::Rendered(doc.source)
    }

    fn filtered(&self, doc: Document) -> Outcome {
        let Some(build_dir) = &self.build_dir else {
            return Outcome::Draft {
                source: doc.source,
                retracted: None,
            };
        };

        match remove_page(build_dir, &doc.destination) {
            Ok(removed) => Outcome::Draft {
                source: doc.source,
                retracted: removed.then_some(doc.destination),
            },
            Err(source) => Outcome::Failed(DocumentFailure {
                path: doc.source,
                error: StageError::Remove {
                    path: build_dir.join(&doc.destination),
                    source,
                },
            }),
        }
    }
}

/// Delete `destination` under `build_dir`, plus its directory when that is
/// left empty. Returns whether a page existed.
fn remove_page(build_dir: &Path, destination: &Path) -> io::Result<bool> {
    let path = build_dir.join(destination);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    debug!(path = %path.display(), "removed page of filtered document");

    if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty())
        && fs::remove_dir(build_dir.join(dir)).is_ok()
    {
        trace!(dir = %dir.display(), "removed empty page directory");
    }
    Ok(true)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_newer(modified: Option<DateTime<Utc>>, since: Option<DateTime<Utc>>) -> bool {
    match (modified, since) {
        (_, None) | (None, Some(_)) => true,
        (Some(modified), Some(since)) => modified > since,
    }
}
