//! Yoda Core Library
//!
//! Core types, configuration, metadata and error handling for the Yoda static site builder.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;
pub mod metadata;

pub use config::Config;
pub use content::{Document, DocumentStatus, destination_for};
pub use error::{CoreError, Result};
pub use frontmatter::{Frontmatter, FrontmatterFormat};
pub use metadata::{Metadata, MetadataStore};
