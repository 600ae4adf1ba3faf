//! Per-document transform stages.
//!
//! Each stage mutates a [`Document`] in place. A stage either lets the
//! document continue, filters it out, or fails it; a failed document never
//! reaches the write stage.

use std::{
    fmt::Debug,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, trace};
use yoda_core::{
    CoreError, Document, DocumentStatus, Metadata,
    frontmatter::{DRAFT_KEY, is_truthy, parse_frontmatter},
    metadata::overlay,
};
use yoda_parser::{MarkupRenderer, RenderError};

use crate::{
    interpolate::interpolate,
    template::{TemplateContext, TemplateError, TemplateRegistry, inject_before_body_end},
};

/// Why a document failed.
#[derive(Debug, Error)]
pub enum StageError {
    /// Frontmatter or destination problem.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The source is not UTF-8 text.
    #[error("{0} is not valid UTF-8")]
    Encoding(PathBuf),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Output could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stale output of a filtered document could not be removed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happens to a document after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Drop the document without writing anything.
    Filtered,
}

/// One step of the transform pipeline.
pub trait Stage: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError>;
}

/// Splits the frontmatter header from the body.
#[derive(Debug, Default)]
pub struct FrontmatterStage;

impl Stage for FrontmatterStage {
    fn name(&self) -> &'static str {
        "frontmatter"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        let text =
            std::str::from_utf8(&doc.raw).map_err(|_| StageError::Encoding(doc.source.clone()))?;
        let (frontmatter, body) = parse_frontmatter(text, &doc.source)?;
        doc.frontmatter = frontmatter;
        doc.body = body;
        Ok(Flow::Continue)
    }
}

/// Overlays the frontmatter on a snapshot of the global metadata.
#[derive(Debug)]
pub struct MetadataStage {
    snapshot: Arc<Metadata>,
}

impl MetadataStage {
    pub fn new(snapshot: Arc<Metadata>) -> Self {
        Self { snapshot }
    }
}

impl Stage for MetadataStage {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        doc.metadata = overlay(&self.snapshot, doc.frontmatter.fields());
        Ok(Flow::Continue)
    }
}

/// Filters out documents whose effective metadata marks them as drafts.
///
/// Runs after [`MetadataStage`], so a global `draft` value applies to every
/// document unless its frontmatter overrides it.
#[derive(Debug, Default)]
pub struct DraftFilter {
    include_drafts: bool,
}

impl DraftFilter {
    pub fn new(include_drafts: bool) -> Self {
        Self { include_drafts }
    }
}

impl Stage for DraftFilter {
    fn name(&self) -> &'static str {
        "draft"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        if self.include_drafts || !is_truthy(doc.metadata.get(DRAFT_KEY)) {
            return Ok(Flow::Continue);
        }

        debug!(source = %doc.source.display(), "skipping draft");
        doc.status = DocumentStatus::SkippedDraft;
        Ok(Flow::Filtered)
    }
}

/// Substitutes `{{key}}` placeholders in the body.
#[derive(Debug, Default)]
pub struct InterpolateStage;

impl Stage for InterpolateStage {
    fn name(&self) -> &'static str {
        "interpolate"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        let interpolated = interpolate(&doc.body, &doc.metadata).into_owned();
        doc.body = interpolated;
        Ok(Flow::Continue)
    }
}

/// Converts the body to an HTML fragment.
#[derive(Debug)]
pub struct RenderStage {
    renderer: Arc<dyn MarkupRenderer>,
}

impl RenderStage {
    pub fn new(renderer: Arc<dyn MarkupRenderer>) -> Self {
        Self { renderer }
    }
}

impl Stage for RenderStage {
    fn name(&self) -> &'static str {
        "render"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        doc.html = self.renderer.render(&doc.body)?;
        Ok(Flow::Continue)
    }
}

/// Wraps the fragment in the page template.
#[derive(Debug)]
pub struct TemplateStage {
    templates: Arc<TemplateRegistry>,
    default_template: String,
    live_reload: Option<String>,
}

impl TemplateStage {
    pub fn new(templates: Arc<TemplateRegistry>, default_template: impl Into<String>) -> Self {
        Self {
            templates,
            default_template: default_template.into(),
            live_reload: None,
        }
    }

    /// Insert `script` before `</body>` of every page.
    #[must_use]
    pub fn with_live_reload(mut self, script: impl Into<String>) -> Self {
        self.live_reload = Some(script.into());
        self
    }
}

impl Stage for TemplateStage {
    fn name(&self) -> &'static str {
        "template"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        let name = doc
            .frontmatter
            .template()
            .unwrap_or(self.default_template.as_str());

        let context = TemplateContext::from_metadata(&doc.metadata)
            .with_var("content", doc.html.as_str())
            .with_var("path", doc.url());
        let mut page = self.templates.render(name, &context)?;

        if let Some(script) = &self.live_reload {
            page = inject_before_body_end(&page, script);
        }

        trace!(source = %doc.source.display(), template = name, "applied template");
        doc.output = page.into_bytes();
        Ok(Flow::Continue)
    }
}

/// Writes the final bytes under the build root.
#[derive(Debug)]
pub struct WriteStage {
    build_dir: PathBuf,
}

impl WriteStage {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }
}

impl Stage for WriteStage {
    fn name(&self) -> &'static str {
        "write"
    }

    fn process(&self, doc: &mut Document) -> Result<Flow, StageError> {
        let path = self.build_dir.join(&doc.destination);
        write_atomic(&path, &doc.output).map_err(|source| StageError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(source = %doc.source.display(), dest = %path.display(), "wrote page");
        doc.status = DocumentStatus::Rendered;
        Ok(Flow::Continue)
    }
}

/// Write `bytes` to `path` through a temporary sibling, so readers never see
/// a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new(""));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));

    let result = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = result.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
