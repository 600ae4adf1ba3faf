//! Yoda Parser Library
//!
//! Markup renderers used by the content transform pipeline. A renderer turns
//! an interpolated document body into an HTML fragment; template application
//! happens later in the pipeline.

pub mod markdown;
pub mod syntax;

use std::fmt::Debug;

pub use markdown::MarkdownRenderer;
pub use syntax::SyntaxHighlighter;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer rejected its input.
    #[error("{renderer} could not render input: {message}")]
    Rejected {
        renderer: &'static str,
        message: String,
    },
}

/// Result type for renderer operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Converts lightweight markup into an HTML fragment.
pub trait MarkupRenderer: Debug + Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Render `source` to HTML.
    fn render(&self, source: &str) -> Result<String>;
}

/// Escape HTML special characters.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("a & \"b\""), "a &amp; &quot;b&quot;");
    }

    #[test]
    fn test_renderer_trait_object() {
        let renderer: Box<dyn MarkupRenderer> = Box::new(MarkdownRenderer::new());
        assert_eq!(renderer.name(), "markdown");
        assert!(renderer.render("*hi*").unwrap().contains("<em>hi</em>"));
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::Rejected {
            renderer: "markdown",
            message: "bad input".into(),
        };
        assert_eq!(err.to_string(), "markdown could not render input: bad input");
    }
}
