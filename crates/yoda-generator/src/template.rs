//! Page templates.
//!
//! Templates are plain HTML files with `{{ variable }}` placeholders. A
//! trailing `?` (`{{ description? }}`) marks a variable as optional; any other
//! missing variable fails the render.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use yoda_core::{Metadata, metadata::display_value};

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("template '{template}' requires variable '{variable}'")]
    MissingVariable { template: String, variable: String },

    /// Template not found.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Invalid template syntax.
    #[error("invalid template syntax in '{template}': {message}")]
    InvalidSyntax { template: String, message: String },

    /// Template file could not be read.
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// File extensions recognised in the template directory.
const TEMPLATE_EXTENSIONS: [&str; 2] = ["html", "htm"];

/// Variables available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a metadata mapping.
    ///
    /// Nested objects are flattened into dotted names (`site.title`).
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mut context = Self::new();
        for (key, value) in metadata {
            context.insert_value(key, value);
        }
        context
    }

    fn insert_value(&mut self, key: &str, value: &Value) {
        match value {
            Value::Object(map) => {
                for (child, value) in map {
                    self.insert_value(&format!("{key}.{child}"), value);
                }
            }
            other => self.insert(key, display_value(other)),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }
}

/// A named page template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    content: String,
}

impl Template {
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute every placeholder with its value from `context`.
    ///
    /// Substituted values are never scanned again, so a page body containing
    /// `{{` is emitted as is.
    pub fn render(&self, context: &TemplateContext) -> Result<String> {
        let mut result = self.content.clone();
        let mut pos = 0;

        while let Some(start) = result[pos..].find("{{") {
            let start = pos + start;
            let end = result[start..]
                .find("}}")
                .ok_or_else(|| TemplateError::InvalidSyntax {
                    template: self.name.clone(),
                    message: "unclosed {{ delimiter".to_string(),
                })?;
            let end = start + end + 2;

            let var_name = result[start + 2..end - 2].trim();
            let (var_name, optional) = match var_name.strip_suffix('?') {
                Some(stripped) => (stripped.trim_end(), true),
                None => (var_name, false),
            };

            let value = match context.get(var_name) {
                Some(v) => v.to_string(),
                None if optional => String::new(),
                None => {
                    return Err(TemplateError::MissingVariable {
                        template: self.name.clone(),
                        variable: var_name.to_string(),
                    });
                }
            };

            result.replace_range(start..end, &value);
            pos = start + value.len();
        }

        Ok(result)
    }
}

/// Templates by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Registry holding only the built-in `default` template.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(Template::new(DEFAULT_TEMPLATE_NAME, DEFAULT_TEMPLATE));
        registry
    }

    /// Load every template in `dir`, named by file stem.
    ///
    /// Files in `dir` override the built-in template of the same name. A
    /// missing directory leaves just the built-in.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no template directory, using built-in template");
            return Ok(registry);
        }

        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_template = path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| TEMPLATE_EXTENSIONS.iter().any(|t| ext == *t));
            if !is_template {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let content = fs::read_to_string(&path).map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(template = %stem, path = %path.display(), "loaded template");
            registry.register(Template::new(stem, content));
        }

        Ok(registry)
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Registered template names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render a named template with the given context.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let template = self
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        template.render(context)
    }
}

/// Insert `snippet` right before the closing `</body>` tag, or append it when
/// the page has none.
pub fn inject_before_body_end(html: &str, snippet: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + snippet.len());
            out.push_str(&html[..pos]);
            out.push_str(snippet);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{snippet}"),
    }
}

/// Name of the built-in template.
pub const DEFAULT_TEMPLATE_NAME: &str = "default";

/// Built-in page template.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ lang? }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title? }}</title>
    <meta name="description" content="{{ description? }}">
</head>
<body>
    <main>
{{ content }}
    </main>
</body>
</html>
"#;
