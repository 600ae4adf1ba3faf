//! Watch/reload coordinator.
//!
//! File events are debounced into batches, classified into the tasks they
//! affect and queued. A single consumer runs one rebuild at a time; changes
//! arriving meanwhile are merged into exactly one follow-up rebuild.

use std::{
    collections::BTreeSet,
    future::Future,
    mem,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use yoda_core::Config;
use yoda_generator::pipeline::RAW_HTML_EXTENSIONS;
use yoda_tasks::TaskGraph;

use crate::{
    server::ServerState,
    site::{ASSETS, COMPILE, COPY_HTML, FETCH, METADATA, SCRIPTS, STYLE},
};

/// Events closer together than this arrive as one batch.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Order in which planned tasks run.
const PRECEDENCE: [&str; 7] = [FETCH, METADATA, COPY_HTML, COMPILE, ASSETS, STYLE, SCRIPTS];

/// Watched locations of a site.
#[derive(Debug, Clone)]
pub struct WatchRoots {
    pub base: PathBuf,
    pub content: PathBuf,
    pub templates: PathBuf,
    pub style: PathBuf,
    pub scripts: PathBuf,
    pub assets: PathBuf,
    pub metadata_file: PathBuf,
    pub sources_file: PathBuf,
    content_extensions: Vec<String>,
}

impl WatchRoots {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base: config.paths.base.clone(),
            content: config.paths.content.clone(),
            templates: config.paths.templates.clone(),
            style: config.paths.style.clone(),
            scripts: config.paths.scripts.clone(),
            assets: config.paths.assets.clone(),
            metadata_file: config.metadata_path(),
            sources_file: config.sources_path(),
            content_extensions: config.build.content_extensions.clone(),
        }
    }

    /// What a change to `path` means, if anything.
    pub fn classify(&self, path: &Path) -> Option<ChangeKind> {
        if path == self.metadata_file {
            return Some(ChangeKind::Metadata);
        }
        if path == self.sources_file {
            return Some(ChangeKind::Sources);
        }
        if path.starts_with(&self.templates) {
            return Some(ChangeKind::Template);
        }
        if path.starts_with(&self.content) {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if self
                .content_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext))
            {
                return Some(ChangeKind::Content);
            }
            if RAW_HTML_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                return Some(ChangeKind::Html);
            }
            return None;
        }
        if path.starts_with(&self.style) {
            return Some(ChangeKind::Style);
        }
        if path.starts_with(&self.scripts) {
            return Some(ChangeKind::Script);
        }
        if path.starts_with(&self.assets) {
            return Some(ChangeKind::Asset);
        }
        None
    }

    /// Paths to subscribe to.
    ///
    /// The base directory is watched shallowly so the metadata and sources
    /// files are seen even when they are created later.
    fn targets(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let mut targets = vec![(self.base.clone(), RecursiveMode::NonRecursive)];
        for dir in [
            &self.content,
            &self.templates,
            &self.style,
            &self.scripts,
            &self.assets,
        ] {
            if dir.is_dir() {
                targets.push((dir.clone(), RecursiveMode::Recursive));
            }
        }
        if let Some(parent) = self.sources_file.parent()
            && parent != self.base
            && parent.is_dir()
        {
            targets.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
        }
        targets
    }
}

/// Category of a changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Content,
    Html,
    Template,
    Metadata,
    Sources,
    Style,
    Script,
    Asset,
}

/// Tasks to re-run for a batch of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildPlan {
    /// Task names in execution order.
    pub tasks: Vec<&'static str>,
    /// Compile must ignore its last success.
    pub full_compile: bool,
    /// Only stylesheets changed.
    pub css_only: bool,
}

impl RebuildPlan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Classify `changes` and order the affected tasks.
pub fn plan<'a>(
    roots: &WatchRoots,
    changes: impl IntoIterator<Item = &'a PathBuf>,
) -> RebuildPlan {
    let mut wanted = BTreeSet::new();
    let mut full_compile = false;
    let mut only_style = true;

    for path in changes {
        let Some(kind) = roots.classify(path) else {
            continue;
        };
        only_style &= kind == ChangeKind::Style;
        match kind {
            ChangeKind::Content => {
                wanted.insert(COMPILE);
            }
            // Compile re-checks documents against raw page destinations.
            ChangeKind::Html => {
                wanted.extend([COPY_HTML, COMPILE]);
            }
            ChangeKind::Template => {
                wanted.insert(COMPILE);
                full_compile = true;
            }
            ChangeKind::Metadata => {
                wanted.extend([METADATA, COMPILE]);
                full_compile = true;
            }
            ChangeKind::Sources => {
                wanted.extend([FETCH, COMPILE]);
            }
            ChangeKind::Style => {
                wanted.insert(STYLE);
            }
            ChangeKind::Script => {
                wanted.insert(SCRIPTS);
            }
            ChangeKind::Asset => {
                wanted.insert(ASSETS);
            }
        }
    }

    let tasks: Vec<_> = PRECEDENCE
        .into_iter()
        .filter(|task| wanted.contains(task))
        .collect();
    RebuildPlan {
        css_only: only_style && !tasks.is_empty(),
        full_compile,
        tasks,
    }
}

/// Producer side of the rebuild queue.
#[derive(Debug, Clone)]
pub struct RebuildQueue {
    pending: Arc<Mutex<BTreeSet<PathBuf>>>,
    signal: mpsc::Sender<()>,
}

/// Consumer side of the rebuild queue.
#[derive(Debug)]
pub struct PendingRebuilds {
    pending: Arc<Mutex<BTreeSet<PathBuf>>>,
    signal: mpsc::Receiver<()>,
}

/// Create a rebuild queue.
pub fn rebuild_queue() -> (RebuildQueue, PendingRebuilds) {
    let pending = Arc::new(Mutex::new(BTreeSet::new()));
    // Depth one: at most a single follow-up is ever scheduled.
    let (signal, rx) = mpsc::channel(1);
    (
        RebuildQueue {
            pending: Arc::clone(&pending),
            signal,
        },
        PendingRebuilds {
            pending,
            signal: rx,
        },
    )
}

impl RebuildQueue {
    /// Merge `paths` into the pending set and schedule a rebuild.
    pub fn submit(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.extend(paths);
        if pending.is_empty() {
            return;
        }
        drop(pending);
        // A full channel means a rebuild is already scheduled and will see
        // the merged set.
        let _ = self.signal.try_send(());
    }
}

impl PendingRebuilds {
    /// Wait for the next batch. `None` once every queue handle is gone.
    pub async fn next(&mut self) -> Option<BTreeSet<PathBuf>> {
        loop {
            self.signal.recv().await?;
            let batch = {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                mem::take(&mut *pending)
            };
            if !batch.is_empty() {
                return Some(batch);
            }
        }
    }
}

/// Run `rebuild` for each batch, one at a time.
pub async fn drive<F, Fut>(mut pending: PendingRebuilds, mut rebuild: F)
where
    F: FnMut(BTreeSet<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(batch) = pending.next().await {
        rebuild(batch).await;
    }
}

/// Start watching the site, feeding debounced batches into `queue`.
///
/// Events stop when the returned debouncer is dropped.
pub fn start_watcher(
    roots: &WatchRoots,
    queue: RebuildQueue,
) -> Result<Debouncer<RecommendedWatcher>> {
    let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| match result {
        Ok(events) => queue.submit(events.into_iter().map(|event| event.path)),
        Err(e) => warn!(error = %e, "watch error"),
    })
    .wrap_err("Failed to create file watcher")?;

    for (path, mode) in roots.targets() {
        debouncer
            .watcher()
            .watch(&path, mode)
            .wrap_err_with(|| format!("Failed to watch {}", path.display()))?;
        debug!(path = %path.display(), ?mode, "watching");
    }
    Ok(debouncer)
}

/// Re-runs affected tasks and notifies the preview.
#[derive(Debug)]
pub struct Coordinator {
    graph: Arc<TaskGraph>,
    state: Arc<ServerState>,
    roots: WatchRoots,
}

impl Coordinator {
    pub fn new(graph: Arc<TaskGraph>, state: Arc<ServerState>, roots: WatchRoots) -> Self {
        Self {
            graph,
            state,
            roots,
        }
    }

    /// Rebuild for one batch of changed paths.
    pub async fn rebuild(&self, changes: BTreeSet<PathBuf>) {
        let plan = plan(&self.roots, &changes);
        if plan.is_empty() {
            debug!(changes = changes.len(), "no task affected");
            return;
        }
        if plan.full_compile {
            self.graph.forget(COMPILE);
        }

        info!(tasks = ?plan.tasks, changes = changes.len(), "rebuilding");
        println!("  Change detected, running {}", plan.tasks.join(", "));

        match self.graph.run_sequence(&plan.tasks).await {
            Ok(()) if plan.css_only => {
                self.state.notify_css_reload();
            }
            Ok(()) => {
                self.state.notify_reload();
            }
            Err(e) => {
                error!(failed = ?e.failed_tasks(), error = %e, "rebuild failed");
                eprintln!("  ✗ Rebuild failed: {e}");
            }
        }
    }

    /// Watch until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let (queue, pending) = rebuild_queue();
        let _debouncer = start_watcher(&self.roots, queue)?;
        info!(base = %self.roots.base.display(), "watching for changes");

        let coordinator = &self;
        tokio::select! {
            () = drive(pending, move |batch| coordinator.rebuild(batch)) => {}
            () = crate::server::shutdown_signal() => {
                debug!("watch stopped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;
    use yoda_tasks::ActionResult;

    use super::*;
    use crate::server::ReloadMessage;

    fn roots() -> WatchRoots {
        WatchRoots::from_config(&Config::for_base("/site"))
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    fn set(list: &[&str]) -> BTreeSet<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_classify() {
        let roots = roots();
        let cases = [
            ("/site/content/a.md", Some(ChangeKind::Content)),
            ("/site/content/raw/page.html", Some(ChangeKind::Html)),
            ("/site/content/notes.txt", None),
            ("/site/templates/default.html", Some(ChangeKind::Template)),
            ("/site/metadata.json", Some(ChangeKind::Metadata)),
            ("/site/sources.json", Some(ChangeKind::Sources)),
            ("/site/style/main.css", Some(ChangeKind::Style)),
            ("/site/scripts/app.js", Some(ChangeKind::Script)),
            ("/site/assets/logo.svg", Some(ChangeKind::Asset)),
            ("/site/build/index.html", None),
            ("/site/README.md", None),
        ];
        for (path, expected) in cases {
            assert_eq!(roots.classify(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn test_plan_orders_by_precedence() {
        let changes = paths(&[
            "/site/scripts/app.js",
            "/site/content/a.md",
            "/site/sources.json",
            "/site/content/b.html",
        ]);
        let plan = plan(&roots(), &changes);

        assert_eq!(plan.tasks, vec![FETCH, COPY_HTML, COMPILE, SCRIPTS]);
        assert!(!plan.full_compile);
        assert!(!plan.css_only);
    }

    #[test]
    fn test_template_change_forces_full_compile() {
        let plan = plan(&roots(), &paths(&["/site/templates/post.html"]));
        assert_eq!(plan.tasks, vec![COMPILE]);
        assert!(plan.full_compile);
    }

    #[test]
    fn test_metadata_change_reloads_then_compiles() {
        let plan = plan(&roots(), &paths(&["/site/metadata.json"]));
        assert_eq!(plan.tasks, vec![METADATA, COMPILE]);
        assert!(plan.full_compile);
    }

    #[test]
    fn test_css_only() {
        let plan = plan(&roots(), &paths(&["/site/style/a.css", "/site/style/b.css"]));
        assert_eq!(plan.tasks, vec![STYLE]);
        assert!(plan.css_only);

        let mixed = plan_for(&["/site/style/a.css", "/site/assets/x.png"]);
        assert!(!mixed.css_only);
    }

    fn plan_for(list: &[&str]) -> RebuildPlan {
        plan(&roots(), &paths(list))
    }

    #[test]
    fn test_raw_html_change_rechecks_compile() {
        let plan = plan_for(&["/site/content/about.html"]);
        assert_eq!(plan.tasks, vec![COPY_HTML, COMPILE]);
        assert!(!plan.full_compile);
    }

    fn coordinator() -> Coordinator {
        let mut graph = TaskGraph::new();
        graph
            .register(COMPILE, &[], |_ctx| std::future::ready::<ActionResult>(Ok(())))
            .unwrap()
            .register(STYLE, &[], |_ctx| std::future::ready::<ActionResult>(Ok(())))
            .unwrap()
            .register(SCRIPTS, &[], |_ctx| {
                std::future::ready::<ActionResult>(Err("bundle failed".into()))
            })
            .unwrap();
        Coordinator::new(Arc::new(graph), Arc::new(ServerState::new()), roots())
    }

    #[tokio::test]
    async fn test_successful_rebuild_reloads_pages() {
        let coordinator = coordinator();
        let mut rx = coordinator.state.subscribe();

        coordinator.rebuild(set(&["/site/content/a.md"])).await;
        assert_eq!(rx.try_recv().unwrap(), ReloadMessage::Reload);

        coordinator.rebuild(set(&["/site/style/main.css"])).await;
        assert_eq!(rx.try_recv().unwrap(), ReloadMessage::CssReload);
    }

    #[tokio::test]
    async fn test_failed_rebuild_sends_nothing() {
        let coordinator = coordinator();
        let mut rx = coordinator.state.subscribe();

        coordinator.rebuild(set(&["/site/scripts/app.js"])).await;
        assert!(rx.try_recv().is_err());

        coordinator
            .rebuild(set(&["/site/style/main.css", "/site/scripts/app.js"]))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrelated_change_sends_nothing() {
        let coordinator = coordinator();
        let mut rx = coordinator.state.subscribe();

        coordinator.rebuild(set(&["/site/build/index.html"])).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_irrelevant_changes_plan_nothing() {
        let plan = plan_for(&["/site/build/index.html", "/elsewhere/x.md"]);
        assert!(plan.is_empty());
        assert!(!plan.css_only);
    }

    #[tokio::test]
    async fn test_submissions_coalesce() {
        let (queue, mut pending) = rebuild_queue();
        queue.submit(paths(&["/a"]));
        queue.submit(paths(&["/b"]));
        queue.submit(paths(&["/a", "/c"]));

        let batch = pending.next().await.unwrap();
        assert_eq!(batch, set(&["/a", "/b", "/c"]));

        drop(queue);
        assert!(pending.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_submission_schedules_nothing() {
        let (queue, mut pending) = rebuild_queue();
        queue.submit(Vec::new());
        drop(queue);
        assert!(pending.next().await.is_none());
    }

    #[tokio::test]
    async fn test_single_active_rebuild_with_one_follow_up() {
        let (queue, pending) = rebuild_queue();
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));

        let consumer = {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let batches = Arc::clone(&batches);
            tokio::spawn(drive(pending, move |batch| {
                let started = Arc::clone(&started);
                let release = Arc::clone(&release);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                let batches = Arc::clone(&batches);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    let first = batches.lock().unwrap().is_empty();
                    batches.lock().unwrap().push(batch);
                    if first {
                        started.notify_one();
                        release.notified().await;
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            }))
        };

        queue.submit(paths(&["/one"]));
        started.notified().await;

        queue.submit(paths(&["/two"]));
        queue.submit(paths(&["/three"]));
        queue.submit(paths(&["/two"]));
        release.notify_one();

        drop(queue);
        consumer.await.unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], set(&["/one"]));
        assert_eq!(batches[1], set(&["/three", "/two"]));
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }
}
