//! Syntax highlighting for fenced code blocks.

use syntect::{highlighting::ThemeSet, html::highlighted_html_for_string, parsing::SyntaxSet};
use tracing::trace;

use crate::html_escape;

/// Syntax highlighter backed by syntect's bundled grammars and themes.
#[derive(Debug)]
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme: String,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new("base16-ocean.dark")
    }
}

impl SyntaxHighlighter {
    /// Create a highlighter using `theme`, falling back to the first bundled
    /// theme when the name is unknown.
    pub fn new(theme: &str) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme: theme.to_string(),
        }
    }

    /// Highlight `code` written in `lang`.
    ///
    /// Code without a recognised language is escaped into a plain
    /// `<pre><code>` block.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let Some(syntax) = lang.and_then(|l| self.syntax_set.find_syntax_by_token(l)) else {
            return plain_block(code, lang);
        };

        let Some(theme) = self
            .theme_set
            .themes
            .get(&self.theme)
            .or_else(|| self.theme_set.themes.values().next())
        else {
            return plain_block(code, lang);
        };

        highlighted_html_for_string(code, &self.syntax_set, syntax, theme).unwrap_or_else(|e| {
            trace!(error = %e, "highlighting failed, using plain block");
            plain_block(code, lang)
        })
    }
}

fn plain_block(code: &str, lang: Option<&str>) -> String {
    let class = lang
        .filter(|l| !l.is_empty())
        .map(|l| format!(" class=\"language-{}\"", html_escape(l)))
        .unwrap_or_default();
    format!("<pre><code{class}>{}</code></pre>\n", html_escape(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_rust() {
        let highlighter = SyntaxHighlighter::default();
        let html = highlighter.highlight("fn main() {}\n", Some("rust"));

        assert!(html.contains("<pre"));
        assert!(html.contains("main"));
        assert!(html.contains("style="));
    }

    #[test]
    fn test_unknown_language_is_escaped() {
        let highlighter = SyntaxHighlighter::default();
        let html = highlighter.highlight("a < b", Some("not_a_language"));

        assert_eq!(
            html,
            "<pre><code class=\"language-not_a_language\">a &lt; b</code></pre>\n"
        );
    }

    #[test]
    fn test_no_language() {
        let highlighter = SyntaxHighlighter::new("no-such-theme");
        let html = highlighter.highlight("plain", None);

        assert_eq!(html, "<pre><code>plain</code></pre>\n");
    }
}
