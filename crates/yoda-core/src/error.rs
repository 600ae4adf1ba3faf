//! Error types for the Yoda core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types for Yoda.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration loading or validation error. Fatal for the CLI.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Metadata file could not be read or is not a JSON object.
    #[error("Metadata error in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Frontmatter parsing error.
    #[error("Frontmatter error in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },

    /// Two documents resolve to the same output file.
    #[error("Destination collision: {path} is produced by both {first} and {second}")]
    DestinationCollision {
        path: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// File system I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic configuration crate error.
    #[error("Config crate error: {0}")]
    ConfigCrate(#[from] config::ConfigError),
}

impl CoreError {
    /// Create a new configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new frontmatter error.
    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CoreError::config("missing directory");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing directory"));
    }

    #[test]
    fn test_metadata_error() {
        let err = CoreError::metadata("metadata.json", "expected an object");
        assert!(err.to_string().contains("Metadata error"));
        assert!(err.to_string().contains("metadata.json"));
    }

    #[test]
    fn test_frontmatter_error() {
        let err = CoreError::frontmatter("content/post.md", "invalid yaml");
        assert!(err.to_string().contains("Frontmatter error"));
        assert!(err.to_string().contains("content/post.md"));
    }

    #[test]
    fn test_collision_error_names_both_sources() {
        let err = CoreError::DestinationCollision {
            path: "build/a/index.html".into(),
            first: "a.md".into(),
            second: "a/index.md".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.md"));
        assert!(msg.contains("a/index.md"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }
}
