//! Yoda CLI
//!
//! Builds a static site by running a named task from the build graph.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use yoda::cmd::{self, Overrides};

/// Command-line interface for Yoda.
#[derive(Parser)]
#[command(
    name = "yoda",
    version,
    about = "A task-graph driven static site builder"
)]
struct Cli {
    /// Site directory
    #[arg(short = 'd', long = "dir", env = "YODA_DIR", default_value = ".")]
    dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Keep the build directory instead of cleaning it first
    #[arg(long)]
    no_clean: bool,

    /// Write `name.html` instead of `name/index.html`
    #[arg(long)]
    no_pretty: bool,

    /// Include draft documents
    #[arg(long)]
    drafts: bool,

    /// Preview server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Sources descriptor file
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Open the preview in a browser
    #[arg(long)]
    open: bool,

    /// List registered tasks and exit
    #[arg(long)]
    tasks: bool,

    /// Task to run
    #[arg(default_value = "default")]
    task: String,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            no_clean: self.no_clean,
            no_pretty: self.no_pretty,
            drafts: self.drafts,
            port: self.port,
            sources: self.sources.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    yoda::init_tracing(cli.verbose);

    if cli.tasks {
        return cmd::tasks::run(&cli.dir, &cli.overrides());
    }

    cmd::run::run(&cli.dir, &cli.task, &cli.overrides(), cli.open).await
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["yoda"]);

        assert_eq!(cli.dir, PathBuf::from("."));
        assert_eq!(cli.task, "default");
        assert_eq!(cli.verbose, 0);
        assert!(!cli.no_clean);
        assert!(!cli.no_pretty);
        assert!(!cli.drafts);
        assert!(!cli.open);
        assert!(!cli.tasks);
        assert!(cli.port.is_none());
        assert!(cli.sources.is_none());
    }

    #[test]
    fn test_cli_named_task() {
        let cli = Cli::parse_from(["yoda", "-d", "site", "compile"]);
        assert_eq!(cli.dir, PathBuf::from("site"));
        assert_eq!(cli.task, "compile");
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "yoda",
            "--no-clean",
            "--no-pretty",
            "--drafts",
            "--port",
            "8080",
            "--sources",
            "feeds.json",
            "--open",
            "build",
        ]);

        let overrides = cli.overrides();
        assert!(overrides.no_clean);
        assert!(overrides.no_pretty);
        assert!(overrides.drafts);
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.sources, Some(PathBuf::from("feeds.json")));
        assert!(cli.open);
        assert_eq!(cli.task, "build");
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let cli = Cli::parse_from(["yoda", "-vvv", "build"]);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_list_tasks() {
        let cli = Cli::parse_from(["yoda", "--tasks"]);
        assert!(cli.tasks);
    }
}
