//! Tasks command - lists registered tasks

use std::path::Path;

use color_eyre::eyre::Result;
use yoda_tasks::{TaskGraph, TaskKind};

use super::{Overrides, load_config};
use crate::site::{Site, SiteOptions};

/// Print every task registered for the site in `dir`.
pub fn run(dir: &Path, overrides: &Overrides) -> Result<()> {
    let config = load_config(dir, overrides)?;
    let site = Site::new(config, SiteOptions::default());
    let graph = site.graph()?;
    print!("{}", listing(&graph));
    Ok(())
}

/// One line per task: name, composition and description.
pub fn listing(graph: &TaskGraph) -> String {
    let width = graph.tasks().map(|t| t.name().len()).max().unwrap_or(0);

    graph
        .tasks()
        .map(|task| {
            let shape = match task.kind() {
                TaskKind::Action(_) if task.is_incremental() => "action, incremental".to_string(),
                TaskKind::Action(_) => "action".to_string(),
                TaskKind::Series(members) => members.join(" -> "),
                TaskKind::Parallel(members) => members.join(" | "),
                TaskKind::Noop => "noop".to_string(),
            };
            let after = if task.predecessors().is_empty() {
                String::new()
            } else {
                format!(" after {}", task.predecessors().join(", "))
            };
            format!(
                "  {:<width$}  {}  [{shape}{after}]\n",
                task.name(),
                task.description().unwrap_or_default(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{BUILD, COMPILE, DEFAULT};

    #[test]
    fn test_listing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = yoda_core::Config::for_base(dir.path());
        config.build.persist_history = false;
        let site = Site::new(config, SiteOptions::default());
        let listing = listing(&site.graph().unwrap());

        let line = |name: &str| {
            listing
                .lines()
                .find(|l| l.trim_start().starts_with(&format!("{name} ")))
                .unwrap()
                .to_string()
        };
        assert!(line(COMPILE).contains("action, incremental"));
        assert!(line(BUILD).contains("clean -> fetch -> metadata -> outputs"));
        assert!(line(DEFAULT).contains("preview | watch after build"));
        assert_eq!(listing.lines().count(), site.graph().unwrap().tasks().count());
        assert!(listing.ends_with("]\n"));
    }
}
