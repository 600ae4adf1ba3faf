//! Site configuration management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Name of the optional configuration file inside the site base directory.
pub const CONFIG_FILE: &str = "yoda.toml";

/// Main configuration structure for Yoda.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Preview server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Resolved site directories. Derived from the base directory, never read from file.
    #[serde(skip)]
    pub paths: SitePaths,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Write `name/index.html` instead of `name.html`.
    #[serde(default = "default_true")]
    pub pretty_urls: bool,

    /// Remove the build directory before a full build.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Render documents marked as drafts.
    #[serde(default)]
    pub drafts: bool,

    /// File extensions treated as content documents.
    #[serde(default = "default_content_extensions")]
    pub content_extensions: Vec<String>,

    /// Template used when a document does not name one.
    #[serde(default = "default_template")]
    pub default_template: String,

    /// Sources descriptor file, relative to the base directory.
    #[serde(default = "default_sources_file")]
    pub sources_file: String,

    /// Global metadata file, relative to the base directory.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Persist last-success timestamps between runs.
    #[serde(default = "default_true")]
    pub persist_history: bool,

    /// Syntax highlighting theme name.
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,
}

/// Preview server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the local preview server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Inject the live reload script into rendered pages while previewing.
    #[serde(default = "default_true")]
    pub live_reload: bool,
}

/// Well-known directories of a site, all under one base directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitePaths {
    pub base: PathBuf,
    pub content: PathBuf,
    pub templates: PathBuf,
    pub build: PathBuf,
    pub assets: PathBuf,
    pub style: PathBuf,
    pub scripts: PathBuf,
}

impl SitePaths {
    /// Derive all site directories from the base directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            content: base.join("content"),
            templates: base.join("templates"),
            build: base.join("build"),
            assets: base.join("assets"),
            style: base.join("style"),
            scripts: base.join("scripts"),
            base,
        }
    }

    /// Directory holding persisted build state.
    pub fn state_dir(&self) -> PathBuf {
        self.base.join(".yoda")
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_content_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

fn default_template() -> String {
    "default".to_string()
}

fn default_sources_file() -> String {
    "sources.json".to_string()
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pretty_urls: true,
            clean: true,
            drafts: false,
            content_extensions: default_content_extensions(),
            default_template: default_template(),
            sources_file: default_sources_file(),
            metadata_file: default_metadata_file(),
            persist_history: true,
            syntax_theme: default_syntax_theme(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            live_reload: true,
        }
    }
}

impl Config {
    /// Default configuration rooted at `base`.
    pub fn for_base(base: impl Into<PathBuf>) -> Self {
        Self {
            paths: SitePaths::new(base),
            ..Self::default()
        }
    }

    /// Load configuration for the site at `base`.
    ///
    /// Reads `yoda.toml` when present and applies `YODA__SECTION__KEY`
    /// environment overrides on top. The base directory itself must exist.
    pub fn load(base: &Path) -> Result<Self> {
        validate_directory_exists(base)?;

        let file = base.join(CONFIG_FILE);
        let settings = config::Config::builder()
            .add_source(config::File::from(file.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix("YODA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                CoreError::config_with_source(format!("Failed to read {}", file.display()), e)
            })?;

        let mut config: Config = settings.try_deserialize()?;
        config.paths = SitePaths::new(base);
        config.validate()?;

        tracing::debug!(base = %base.display(), "configuration loaded");
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.build.content_extensions.is_empty() {
            return Err(CoreError::config("build.content_extensions cannot be empty"));
        }

        if self.build.default_template.trim().is_empty() {
            return Err(CoreError::config("build.default_template cannot be empty"));
        }

        if self.paths.build == self.paths.base {
            return Err(CoreError::config("build directory cannot be the base directory"));
        }

        Ok(())
    }

    /// Whether `ext` is one of the configured content extensions.
    pub fn is_content_extension(&self, ext: &str) -> bool {
        self.build
            .content_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Absolute path of the sources descriptor file.
    pub fn sources_path(&self) -> PathBuf {
        self.paths.base.join(&self.build.sources_file)
    }

    /// Absolute path of the global metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.paths.base.join(&self.build.metadata_file)
    }

    /// Local preview URL.
    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.server.port)
    }
}

/// Fail with a configuration error when `dir` does not exist.
pub fn validate_directory_exists(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(CoreError::config(format!(
            "{} doesn't exist",
            dir.display()
        )));
    }
    Ok(())
}
