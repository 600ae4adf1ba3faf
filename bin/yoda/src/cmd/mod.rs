//! Command implementations

pub mod run;
pub mod tasks;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use yoda_core::Config;

use crate::site::resolve_base;

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub no_clean: bool,
    pub no_pretty: bool,
    pub drafts: bool,
    pub port: Option<u16>,
    pub sources: Option<PathBuf>,
}

impl Overrides {
    /// Apply the overrides to `config`.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if self.no_clean {
            config.build.clean = false;
        }
        if self.no_pretty {
            config.build.pretty_urls = false;
        }
        if self.drafts {
            config.build.drafts = true;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(sources) = &self.sources {
            let sources = std::path::absolute(sources)
                .wrap_err_with(|| format!("Invalid sources path {}", sources.display()))?;
            config.build.sources_file = sources.to_string_lossy().into_owned();
        }
        Ok(())
    }
}

/// Load the configuration for the site in `dir` and apply `overrides`.
///
/// A missing site directory is fatal.
pub fn load_config(dir: &Path, overrides: &Overrides) -> Result<Config> {
    let base = resolve_base(dir).wrap_err("Invalid site directory")?;
    let mut config = Config::load(&base).wrap_err("Failed to load configuration")?;
    overrides.apply(&mut config)?;
    config.validate().wrap_err("Invalid configuration")?;

    tracing::debug!(?config, "configuration ready");
    Ok(config)
}
