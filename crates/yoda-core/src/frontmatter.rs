//! Frontmatter parsing for content files.

use std::path::Path;

use serde_json::Value;

use crate::{
    error::{CoreError, Result},
    metadata::Metadata,
};

/// Frontmatter key naming the template to render with.
pub const TEMPLATE_KEY: &str = "template";

/// Frontmatter key marking a document as a draft.
pub const DRAFT_KEY: &str = "draft";

/// Parsed frontmatter header: an ordered mapping of keys to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    fields: Metadata,
}

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

impl Frontmatter {
    /// Wrap an existing mapping.
    pub fn from_fields(fields: Metadata) -> Self {
        Self { fields }
    }

    /// Borrow the underlying mapping.
    pub fn fields(&self) -> &Metadata {
        &self.fields
    }

    /// Look up a single key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Template named by the header, if any.
    pub fn template(&self) -> Option<&str> {
        self.get(TEMPLATE_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Whether a metadata value marks a document as a draft.
///
/// Accepts a boolean `true` or the string `"true"` (case-insensitive).
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Split content into frontmatter and body.
///
/// The header must open at the very start of the document (leading blank
/// lines are tolerated) and the closing delimiter must start a line.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start_matches(['\u{feff}', '\n', '\r']);

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();
    let after_first = &content[delimiter.len()..];
    // Opening delimiter must be alone on its line
    let after_first = after_first
        .strip_prefix("\r\n")
        .or_else(|| after_first.strip_prefix('\n'))?;

    let closing_pos = if after_first.starts_with(delimiter) {
        0
    } else {
        after_first.find(&format!("\n{delimiter}"))? + 1
    };

    let frontmatter = after_first[..closing_pos].trim();
    let rest = &after_first[closing_pos + delimiter.len()..];
    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    Some((format, frontmatter, body))
}

/// Parse frontmatter from a document, returning the header and the body.
///
/// A document without a header yields empty frontmatter and its full text as
/// body. A header that is not valid YAML/TOML, or not a mapping, is an error.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    let fields = match format {
        FrontmatterFormat::Yaml => parse_yaml(fm_str, path)?,
        FrontmatterFormat::Toml => parse_toml(fm_str, path)?,
    };

    Ok((Frontmatter { fields }, body.to_string()))
}

fn parse_yaml(source: &str, path: &Path) -> Result<Metadata> {
    if source.is_empty() {
        return Ok(Metadata::new());
    }

    let value: Value =
        serde_yaml::from_str(source).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        other => Err(CoreError::frontmatter(
            path,
            format!("expected a mapping, found {}", kind_of(&other)),
        )),
    }
}

fn parse_toml(source: &str, path: &Path) -> Result<Metadata> {
    let table: toml::Table =
        toml::from_str(source).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;

    Ok(table
        .into_iter()
        .map(|(key, value)| (key, toml_to_json(value)))
        .collect())
}

/// Convert a TOML value to JSON. Datetimes become their RFC 3339 string.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
