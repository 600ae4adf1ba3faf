//! Yoda CLI Library
//!
//! Task registration, the preview server and the watch/reload coordinator
//! behind the `yoda` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (run a task, list tasks)
//! - [`site`] - The site orchestrator and its named tasks
//! - [`server`] - Preview server with live reload
//! - [`watch`] - Change classification and rebuild coordination
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use yoda::site::{Site, SiteOptions};
//! use yoda_core::Config;
//!
//! # async fn demo() -> color_eyre::Result<()> {
//! let config = Config::load(std::path::Path::new("."))?;
//! let site = Site::new(config, SiteOptions::default());
//! let graph = site.graph()?;
//! graph.run("build").await?;
//! # Ok(())
//! # }
//! ```

pub mod cmd;
pub mod server;
pub mod site;
pub mod watch;

pub use site::{Site, SiteOptions};
pub use yoda_core::Config;

/// Initialize tracing with the specified verbosity level.
///
/// `verbose` maps 0 to WARN, 1 to INFO, 2 to DEBUG and anything higher to
/// TRACE. `RUST_LOG` directives are honored on top.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
