//! Markdown renderer using pulldown-cmark.

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::{MarkupRenderer, Result, syntax::SyntaxHighlighter};

/// CommonMark renderer with GitHub-style extensions and code highlighting.
#[derive(Debug)]
pub struct MarkdownRenderer {
    highlighter: SyntaxHighlighter,
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Create a renderer with the default highlighting theme.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            highlighter: SyntaxHighlighter::default(),
            options,
        }
    }

    /// Create a renderer with a custom syntax theme.
    pub fn with_theme(theme: &str) -> Self {
        Self {
            highlighter: SyntaxHighlighter::new(theme),
            ..Self::new()
        }
    }

    /// Render markdown to HTML, replacing fenced code with highlighted blocks.
    pub fn to_html(&self, source: &str) -> String {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in Parser::new_ext(source, self.options) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, buffer)) = code.as_mut() {
                        buffer.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, buffer)) = code.take() {
                        let block = self.highlighter.highlight(&buffer, lang.as_deref());
                        events.push(Event::Html(CowStr::from(block)));
                    }
                }
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        out
    }
}

impl MarkupRenderer for MarkdownRenderer {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn render(&self, source: &str) -> Result<String> {
        Ok(self.to_html(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_markdown() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html("# Hello World\n\nThis is a test.");

        assert!(html.contains("<h1>Hello World</h1>"));
        assert!(html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_code_block_is_highlighted() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html("```rust\nfn main() {}\n```\n");

        assert!(html.contains("<pre"));
        assert!(html.contains("main"));
        assert!(!html.contains("```"));
    }

    #[test]
    fn test_indented_code_is_escaped() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html("    <b>raw</b>\n");

        assert!(html.contains("&lt;b&gt;raw&lt;/b&gt;"));
    }

    #[test]
    fn test_table_rendering() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html(
            "| Header 1 | Header 2 |\n|----------|----------|\n| Cell 1   | Cell 2   |",
        );

        assert!(html.contains("<table>"));
        assert!(html.contains("<thead>"));
        assert!(html.contains("<td>Cell 1</td>"));
    }

    #[test]
    fn test_task_list() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html("- [x] Done\n- [ ] Not done");

        assert!(html.contains("checkbox"));
        assert!(html.contains("checked"));
    }

    #[test]
    fn test_inline_html_passes_through() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.to_html("<div class=\"note\">kept</div>\n");

        assert!(html.contains("<div class=\"note\">kept</div>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = MarkdownRenderer::with_theme("InspiredGitHub");
        let source = "## Title\n\n```python\nprint('x')\n```\n";
        assert_eq!(renderer.to_html(source), renderer.to_html(source));
    }
}
