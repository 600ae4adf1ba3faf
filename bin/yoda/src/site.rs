//! The site orchestrator.
//!
//! A [`Site`] owns the configuration and the global metadata store, and
//! registers the named build tasks into a [`TaskGraph`]:
//!
//! ```text
//! build   = clean -> fetch -> metadata -> outputs
//! outputs = copyHtml | compile | assets | style | scripts
//! default = build, then preview | watch
//! ```

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock, Weak},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use yoda_core::{Config, Metadata, MetadataStore};
use yoda_generator::{
    CopyTree, Fetcher, Pipeline, SourcesFile, TemplateRegistry, pipeline::RAW_HTML_EXTENSIONS,
};
use yoda_parser::{MarkdownRenderer, MarkupRenderer};
use yoda_tasks::{ActionResult, RunHistory, Task, TaskContext, TaskGraph};

use crate::{
    server::{self, LIVERELOAD_SCRIPT, ServerState},
    watch::{Coordinator, WatchRoots},
};

pub const CLEAN: &str = "clean";
pub const FETCH: &str = "fetch";
pub const METADATA: &str = "metadata";
pub const COMPILE: &str = "compile";
pub const COPY_HTML: &str = "copyHtml";
pub const ASSETS: &str = "assets";
pub const STYLE: &str = "style";
pub const SCRIPTS: &str = "scripts";
pub const OUTPUTS: &str = "outputs";
pub const PREVIEW: &str = "preview";
pub const WATCH: &str = "watch";
pub const BUILD: &str = "build";
pub const DEFAULT: &str = "default";

/// File under the state directory holding last-success times.
const HISTORY_FILE: &str = "history.json";

/// How the site is being run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteOptions {
    /// Pages are built for the preview server and carry the live reload
    /// script.
    pub serving: bool,
    /// Open the preview in a browser once it listens.
    pub open_browser: bool,
}

impl SiteOptions {
    /// Options for running `task`.
    pub fn for_task(task: &str, open_browser: bool) -> Self {
        Self {
            serving: matches!(task, DEFAULT | PREVIEW | WATCH),
            open_browser,
        }
    }
}

/// A site and the tasks that build it.
#[derive(Debug)]
pub struct Site {
    config: Config,
    options: SiteOptions,
    metadata: RwLock<MetadataStore>,
    renderer: Arc<dyn MarkupRenderer>,
    reload: Arc<ServerState>,
    graph: Mutex<Weak<TaskGraph>>,
}

impl Site {
    /// Create a site, loading the metadata file when present.
    ///
    /// A malformed metadata file is logged and the store starts empty.
    pub fn new(config: Config, options: SiteOptions) -> Arc<Self> {
        let mut store = MetadataStore::default();
        match store.load(&config.metadata_path()) {
            Ok(true) => {}
            Ok(false) => info!("no metadata file, starting with empty metadata"),
            Err(e) => warn!(error = %e, "metadata not loaded, using defaults"),
        }

        let renderer = Arc::new(MarkdownRenderer::with_theme(&config.build.syntax_theme));
        Arc::new(Self {
            config,
            options,
            metadata: RwLock::new(store),
            renderer,
            reload: Arc::new(ServerState::new()),
            graph: Mutex::new(Weak::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Broadcaster used for live reload events.
    pub fn reload(&self) -> &Arc<ServerState> {
        &self.reload
    }

    /// Current metadata snapshot.
    pub fn metadata(&self) -> Arc<Metadata> {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Register every named task.
    ///
    /// Later calls return the same graph while it is alive.
    pub fn graph(self: &Arc<Self>) -> yoda_tasks::Result<Arc<TaskGraph>> {
        let mut current = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(graph) = current.upgrade() {
            return Ok(graph);
        }

        let mut graph = TaskGraph::with_history(self.history());

        if self.config.build.clean {
            graph.add(self.action(CLEAN, Self::clean).describe("Remove the build directory"))?;
        } else {
            graph.add(Task::noop(CLEAN).describe("Keep the build directory (--no-clean)"))?;
        }

        graph
            .add(
                self.action(FETCH, Self::fetch)
                    .describe("Refresh sources listed in the sources file"),
            )?
            .add(
                self.action(METADATA, Self::reload_metadata)
                    .describe("Reload global metadata"),
            )?
            .add(
                self.action(COMPILE, Self::compile)
                    .incremental()
                    .describe("Render content documents changed since the last build"),
            )?
            .add(
                self.copy_task(COPY_HTML, |config| {
                    CopyTree::new(&config.paths.content, &config.paths.build)
                        .only_extensions(RAW_HTML_EXTENSIONS)
                })
                .describe("Copy raw HTML content into the build directory"),
            )?
            .add(
                self.copy_task(ASSETS, |config| {
                    CopyTree::new(&config.paths.assets, config.paths.build.join("assets"))
                })
                .describe("Copy assets"),
            )?
            .add(
                self.copy_task(STYLE, |config| {
                    CopyTree::new(&config.paths.style, config.paths.build.join("style"))
                })
                .describe("Copy stylesheets"),
            )?
            .add(
                self.copy_task(SCRIPTS, |config| {
                    CopyTree::new(&config.paths.scripts, config.paths.build.join("scripts"))
                })
                .describe("Copy scripts"),
            )?
            .add(self.action(PREVIEW, Self::preview).describe("Serve the build directory"))?
            .add(self.action(WATCH, Self::watch).describe("Rebuild on change and reload pages"))?
            .add(
                Task::parallel(OUTPUTS, [COPY_HTML, COMPILE, ASSETS, STYLE, SCRIPTS])
                    .describe("Produce every output concurrently"),
            )?
            .add(
                Task::series(BUILD, [CLEAN, FETCH, METADATA, OUTPUTS])
                    .describe("Build the site"),
            )?
            .add(
                Task::parallel(DEFAULT, [PREVIEW, WATCH])
                    .after([BUILD])
                    .describe("Build, preview and watch"),
            )?;

        let graph = Arc::new(graph);
        *current = Arc::downgrade(&graph);
        Ok(graph)
    }

    fn current_graph(&self) -> Option<Arc<TaskGraph>> {
        self.graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// History backing incremental tasks.
    ///
    /// Previewed pages carry the live reload script, so a preview session
    /// never trusts or updates the persisted history and drops the compile
    /// entry to force the next regular build to re-render everything.
    fn history(&self) -> RunHistory {
        let path = self.config.paths.state_dir().join(HISTORY_FILE);
        if self.options.serving {
            if path.exists() {
                RunHistory::persistent(&path).forget(COMPILE);
            }
            return RunHistory::in_memory();
        }
        if self.config.build.persist_history {
            RunHistory::persistent(path)
        } else {
            RunHistory::in_memory()
        }
    }

    fn action<F, Fut>(self: &Arc<Self>, name: &str, action: F) -> Task
    where
        F: Fn(Arc<Self>, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let site = Arc::clone(self);
        Task::action(name, move |ctx| action(Arc::clone(&site), ctx))
    }

    fn copy_task<F>(self: &Arc<Self>, name: &str, tree: F) -> Task
    where
        F: Fn(&Config) -> CopyTree + Send + Sync + 'static,
    {
        self.action(name, move |site, ctx| {
            let tree = tree(&site.config);
            copy(tree, ctx)
        })
        .incremental()
    }

    fn live_reload(&self) -> Option<&'static str> {
        (self.options.serving && self.config.server.live_reload).then_some(LIVERELOAD_SCRIPT)
    }

    async fn clean(self: Arc<Self>, _ctx: TaskContext) -> ActionResult {
        let build = self.config.paths.build.clone();
        let removed = tokio::task::spawn_blocking(move || yoda_generator::clean(&build)).await??;

        // Outputs are gone, so incremental tasks must start over.
        if let Some(graph) = self.current_graph() {
            graph.history().clear();
        }
        info!(dir = %self.config.paths.build.display(), removed, "build directory cleaned");
        Ok(())
    }

    async fn fetch(self: Arc<Self>, _ctx: TaskContext) -> ActionResult {
        let sources = SourcesFile::load(&self.config.sources_path())?;
        if sources.is_empty() {
            return Ok(());
        }

        let fetcher = Fetcher::new(&self.config.paths.base)?;
        let report = fetcher.fetch_all(&sources.sources).await;
        if report.content_changed(&sources.sources) {
            info!("content sources updated");
        }
        println!(
            "  Fetched {} source(s), {} unchanged, {} failed",
            report.updated.len(),
            report.unchanged.len(),
            report.failures.len()
        );
        for failure in &report.failures {
            eprintln!("  ✗ {failure}");
        }

        report.into_result()?;
        Ok(())
    }

    async fn reload_metadata(self: Arc<Self>, _ctx: TaskContext) -> ActionResult {
        let path = self.config.metadata_path();
        let mut store = self.metadata.write().unwrap_or_else(PoisonError::into_inner);
        match store.load(&path) {
            Ok(true) => debug!(keys = store.len(), "metadata reloaded"),
            Ok(false) => info!(path = %path.display(), "no metadata file"),
            Err(e) => warn!(error = %e, "metadata not reloaded, keeping previous values"),
        }
        Ok(())
    }

    async fn compile(self: Arc<Self>, ctx: TaskContext) -> ActionResult {
        let since = ctx.since().filter(|since| {
            self.config.paths.build.is_dir()
                && !changed_since(
                    &[
                        self.config.paths.templates.as_path(),
                        self.config.metadata_path().as_path(),
                    ],
                    *since,
                )
        });
        if ctx.since().is_some() && since.is_none() {
            info!("templates or metadata changed, compiling everything");
        }

        let templates = TemplateRegistry::load_dir(&self.config.paths.templates)?;
        let pipeline = Pipeline::standard(
            &self.config,
            self.metadata(),
            Arc::clone(&self.renderer),
            Arc::new(templates),
            self.live_reload(),
        );

        let report = tokio::task::spawn_blocking(move || pipeline.run(since)).await??;
        println!(
            "  ✓ Compiled {} document(s) in {}ms ({} unchanged, {} draft(s), {} failed)",
            report.rendered.len(),
            report.duration_ms,
            report.unchanged,
            report.drafts.len(),
            report.failures.len()
        );
        if !report.retracted.is_empty() {
            println!("  ✓ Removed {} page(s) now marked as draft", report.retracted.len());
        }
        for failure in &report.failures {
            eprintln!("  ✗ {failure}");
        }

        report.into_result()?;
        Ok(())
    }

    async fn preview(self: Arc<Self>, _ctx: TaskContext) -> ActionResult {
        server::serve(
            &self.config.paths.build,
            self.config.server.port,
            Arc::clone(&self.reload),
            self.options.open_browser,
        )
        .await?;
        Ok(())
    }

    async fn watch(self: Arc<Self>, _ctx: TaskContext) -> ActionResult {
        let Some(graph) = self.current_graph() else {
            return Err("task graph is no longer available".into());
        };
        let coordinator = Coordinator::new(
            graph,
            Arc::clone(&self.reload),
            WatchRoots::from_config(&self.config),
        );
        coordinator.run().await?;
        Ok(())
    }
}

/// Copy `tree`, limited to files changed since the last copy while the
/// destination still exists.
async fn copy(tree: CopyTree, ctx: TaskContext) -> ActionResult {
    let since = ctx.since().filter(|_| tree.dest_dir().is_dir());
    let report = tokio::task::spawn_blocking(move || tree.run(since)).await??;
    debug!(task = ctx.name(), copied = report.copied.len(), "copy finished");
    Ok(())
}

/// Whether any file at or under `paths` was modified after `since`.
fn changed_since(paths: &[&Path], since: DateTime<Utc>) -> bool {
    paths
        .iter()
        .flat_map(|path| WalkDir::new(path).into_iter().filter_map(Result::ok))
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .any(|modified| DateTime::<Utc>::from(modified) > since)
}

/// Resolve `dir` to an absolute path, failing when it does not exist.
pub fn resolve_base(dir: &Path) -> yoda_core::Result<PathBuf> {
    yoda_core::config::validate_directory_exists(dir)?;
    Ok(dir.canonicalize()?)
}
