//! Yoda Generator Library
//!
//! Content transformation and file production for Yoda sites.
//!
//! # Modules
//!
//! - [`pipeline`] - Document discovery and parallel stage execution
//! - [`stages`] - Frontmatter, metadata, draft, interpolation, render, template and write stages
//! - [`interpolate`] - `{{key}}` substitution against document metadata
//! - [`template`] - HTML page templates loaded from the site's template directory
//! - [`fetch`] - Remote and local source fetching
//! - [`assets`] - Static file copying
//! - [`clean`] - Build directory removal

pub mod assets;
pub mod clean;
pub mod fetch;
pub mod interpolate;
pub mod pipeline;
pub mod stages;
pub mod template;

pub use assets::{AssetError, CopyReport, CopyTree};
pub use clean::clean;
pub use fetch::{
    FetchError, FetchFailure, FetchReport, FetchStatus, Fetcher, SourceDescriptor, SourceKind,
    SourcesFile,
};
pub use pipeline::{DocumentFailure, Pipeline, PipelineError, PipelineReport};
pub use stages::{Flow, Stage, StageError};
pub use template::{Template, TemplateContext, TemplateError, TemplateRegistry};
