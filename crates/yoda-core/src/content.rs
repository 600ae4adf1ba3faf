//! Content documents and their output locations.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{frontmatter::Frontmatter, metadata::Metadata};

/// Processing state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentStatus {
    /// Read but not yet through every stage.
    #[default]
    Pending,
    /// Filtered out because it is marked as a draft.
    SkippedDraft,
    /// Written to the build tree.
    Rendered,
    /// A stage failed.
    Failed,
}

/// A content document flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source path relative to the content root. Identifies the document.
    pub source: PathBuf,

    /// Raw file content.
    pub raw: Vec<u8>,

    /// Source modification time.
    pub modified: Option<DateTime<Utc>>,

    /// Body text once the frontmatter is split off.
    pub body: String,

    /// Parsed frontmatter header.
    pub frontmatter: Frontmatter,

    /// Global metadata overlaid by the frontmatter.
    pub metadata: Metadata,

    pub status: DocumentStatus,

    /// Rendered HTML fragment.
    pub html: String,

    /// Final bytes written to the destination.
    pub output: Vec<u8>,

    /// Output path relative to the build root.
    pub destination: PathBuf,
}

impl Document {
    /// Create a pending document for `source`.
    pub fn new(
        source: impl Into<PathBuf>,
        raw: Vec<u8>,
        modified: Option<DateTime<Utc>>,
        pretty_urls: bool,
    ) -> Self {
        let source = source.into();
        let destination = destination_for(&source, pretty_urls);
        Self {
            source,
            raw,
            modified,
            body: String::new(),
            frontmatter: Frontmatter::default(),
            metadata: Metadata::new(),
            status: DocumentStatus::Pending,
            html: String::new(),
            output: Vec::new(),
            destination,
        }
    }

    /// Read `relative` from under `content_root`.
    pub fn read(content_root: &Path, relative: &Path, pretty_urls: bool) -> std::io::Result<Self> {
        let path = content_root.join(relative);
        let raw = std::fs::read(&path)?;
        let modified = std::fs::metadata(&path)?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(Self::new(relative, raw, modified, pretty_urls))
    }

    /// Site-relative URL of the rendered page.
    pub fn url(&self) -> String {
        url_for(&self.destination)
    }
}

/// Compute the output path for a source document.
///
/// With pretty URLs `foo/bar.md` becomes `foo/bar/index.html` and
/// `foo/index.md` stays `foo/index.html`; otherwise `foo/bar.md` becomes
/// `foo/bar.html`.
///
/// `..` components are resolved lexically and never climb above the root.
pub fn destination_for(source: &Path, pretty_urls: bool) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in source.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let source = normalized;

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = source.parent().unwrap_or(Path::new(""));

    if !pretty_urls || stem == "index" {
        return parent.join(format!("{stem}.html"));
    }

    parent.join(stem).join("index.html")
}

/// URL path for a destination relative to the build root.
pub fn url_for(destination: &Path) -> String {
    let path = destination.to_string_lossy().replace('\\', "/");
    match path.strip_suffix("index.html") {
        Some(dir) => format!("/{dir}"),
        None => format!("/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_pretty_destination() {
        assert_eq!(
            destination_for(Path::new("foo/bar.md"), true),
            PathBuf::from("foo/bar/index.html")
        );
        assert_eq!(
            destination_for(Path::new("about.md"), true),
            PathBuf::from("about/index.html")
        );
    }

    #[test]
    fn test_pretty_index_stays_in_place() {
        assert_eq!(
            destination_for(Path::new("index.md"), true),
            PathBuf::from("index.html")
        );
        assert_eq!(
            destination_for(Path::new("docs/index.md"), true),
            PathBuf::from("docs/index.html")
        );
    }

    #[test]
    fn test_flat_destination() {
        assert_eq!(
            destination_for(Path::new("foo/bar.md"), false),
            PathBuf::from("foo/bar.html")
        );
        assert_eq!(
            destination_for(Path::new("foo/bar.markdown"), false),
            PathBuf::from("foo/bar.html")
        );
    }

    #[test]
    fn test_destination_resolves_dot_components() {
        assert_eq!(
            destination_for(Path::new("./foo/../bar.md"), false),
            PathBuf::from("bar.html")
        );
        assert_eq!(
            destination_for(Path::new("a/./b/../c.md"), true),
            PathBuf::from("a/c/index.html")
        );
    }

    #[test]
    fn test_destination_stays_under_root() {
        assert_eq!(
            destination_for(Path::new("../../x.md"), false),
            PathBuf::from("x.html")
        );
        assert_eq!(
            destination_for(Path::new("/abs/y.md"), true),
            PathBuf::from("abs/y/index.html")
        );
    }

    #[test]
    fn test_url_for() {
        assert_eq!(url_for(Path::new("foo/bar/index.html")), "/foo/bar/");
        assert_eq!(url_for(Path::new("index.html")), "/");
        assert_eq!(url_for(Path::new("foo/bar.html")), "/foo/bar.html");
    }

    #[test]
    fn test_document_new() {
        let doc = Document::new("posts/hello.md", b"hi".to_vec(), None, true);
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.destination, PathBuf::from("posts/hello/index.html"));
        assert_eq!(doc.url(), "/posts/hello/");
    }

    #[test]
    fn test_document_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("posts")).unwrap();
        std::fs::write(dir.path().join("posts/a.md"), "# A").unwrap();

        let doc = Document::read(dir.path(), Path::new("posts/a.md"), false).unwrap();

        assert_eq!(doc.raw, b"# A");
        assert!(doc.modified.is_some());
        assert_eq!(doc.destination, PathBuf::from("posts/a.html"));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,8}"
    }

    proptest! {
        #[test]
        fn destination_is_deterministic(
            dirs in prop::collection::vec(segment(), 0..4),
            stem in segment(),
            pretty in any::<bool>(),
        ) {
            let mut source: PathBuf = dirs.iter().collect();
            source.push(format!("{stem}.md"));

            let first = destination_for(&source, pretty);
            let second = destination_for(&source, pretty);

            prop_assert_eq!(&first, &second);
            prop_assert!(first.is_relative());
            prop_assert_eq!(first.extension().and_then(|e| e.to_str()), Some("html"));
        }

        #[test]
        fn flat_destinations_are_injective(
            a in prop::collection::vec(segment(), 1..4),
            b in prop::collection::vec(segment(), 1..4),
        ) {
            let source_a: PathBuf = a.iter().collect::<PathBuf>().with_extension("md");
            let source_b: PathBuf = b.iter().collect::<PathBuf>().with_extension("md");
            prop_assume!(source_a != source_b);

            prop_assert_ne!(
                destination_for(&source_a, false),
                destination_for(&source_b, false)
            );
        }
    }
}
