//! Run command - executes a named task

use std::{path::Path, time::Instant};

use color_eyre::eyre::{Result, eyre};
use yoda_tasks::TaskError;

use super::{Overrides, load_config};
use crate::site::{Site, SiteOptions};

/// Run `task` for the site in `dir`.
pub async fn run(dir: &Path, task: &str, overrides: &Overrides, open_browser: bool) -> Result<()> {
    let start = Instant::now();
    let config = load_config(dir, overrides)?;
    tracing::info!(base = %config.paths.base.display(), task, "starting");

    let site = Site::new(config, SiteOptions::for_task(task, open_browser));
    let graph = site.graph()?;

    match graph.run(task).await {
        Ok(()) => {
            println!();
            println!("  ✓ {task} finished in {:.2}s", start.elapsed().as_secs_f64());
            println!("  Output: {}", site.config().paths.build.display());
            println!();
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            Err(eyre!(e).wrap_err(format!("Task '{task}' failed")))
        }
    }
}

/// Print which tasks failed and why.
fn report_failure(error: &TaskError) {
    eprintln!();
    eprintln!("  ✗ Failed tasks: {}", error.failed_tasks().join(", "));
    for cause in error.root_causes() {
        eprintln!("    - {cause}");
    }
    eprintln!();
}
