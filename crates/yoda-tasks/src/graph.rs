//! Task registration, validation and execution.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::Arc,
    time::Instant,
};

use chrono::Utc;
use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    context::TaskContext,
    error::{Result, TaskError},
    history::RunHistory,
    task::{Action, ActionResult, Task, TaskKind},
};

type Outcome = std::result::Result<(), TaskError>;
type OutcomeFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// A named set of tasks and the relations between them.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: HashMap<String, Arc<Task>>,
    order: Vec<String>,
    history: Arc<RunHistory>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    /// Create an empty graph with an in-memory run history.
    pub fn new() -> Self {
        Self::with_history(RunHistory::in_memory())
    }

    /// Create an empty graph backed by `history`.
    pub fn with_history(history: RunHistory) -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            history: Arc::new(history),
        }
    }

    /// Add a fully built task.
    pub fn add(&mut self, task: Task) -> Result<&mut Self> {
        if self.tasks.contains_key(&task.name) {
            return Err(TaskError::DuplicateTask(task.name));
        }

        debug!(task = %task.name, kind = ?task.kind, "registered task");
        self.order.push(task.name.clone());
        self.tasks.insert(task.name.clone(), Arc::new(task));
        Ok(self)
    }

    /// Register an action that starts once every predecessor succeeded.
    pub fn register<F, Fut>(
        &mut self,
        name: &str,
        predecessors: &[&str],
        action: F,
    ) -> Result<&mut Self>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.add(Task::action(name, action).after(predecessors.iter().copied()))
    }

    /// Register a composite running `members` one after another.
    pub fn series(&mut self, name: &str, members: &[&str]) -> Result<&mut Self> {
        self.add(Task::series(name, members.iter().copied()))
    }

    /// Register a composite running `members` concurrently.
    pub fn parallel(&mut self, name: &str, members: &[&str]) -> Result<&mut Self> {
        self.add(Task::parallel(name, members.iter().copied()))
    }

    /// Register a task that always succeeds.
    pub fn noop(&mut self, name: &str) -> Result<&mut Self> {
        self.add(Task::noop(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name).map(Arc::as_ref)
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order
            .iter()
            .filter_map(|name| self.tasks.get(name).map(Arc::as_ref))
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Drop the last-success timestamp of `name`.
    ///
    /// The next run of that task receives no `since` and does a full pass.
    pub fn forget(&self, name: &str) {
        debug!(task = %name, "forgetting last success");
        self.history.forget(name);
    }

    /// Check that every name reachable from `roots` exists and that the
    /// reachable subgraph is acyclic.
    pub fn validate(&self, roots: &[&str]) -> Result<()> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for root in roots {
            let Some((name, _)) = self.tasks.get_key_value(*root) else {
                return Err(TaskError::UnknownTask {
                    name: (*root).to_string(),
                    referenced_by: None,
                });
            };
            if !nodes.contains_key(name.as_str()) {
                nodes.insert(name, graph.add_node(name));
                queue.push_back(name);
            }
        }

        while let Some(name) = queue.pop_front() {
            let from = nodes[name];
            for reference in self.tasks[name].references() {
                if !self.tasks.contains_key(reference) {
                    return Err(TaskError::UnknownTask {
                        name: reference.clone(),
                        referenced_by: Some(name.to_string()),
                    });
                }

                let to = match nodes.get(reference.as_str()) {
                    Some(index) => *index,
                    None => {
                        let index = graph.add_node(reference);
                        nodes.insert(reference, index);
                        queue.push_back(reference);
                        index
                    }
                };
                graph.add_edge(from, to, ());
            }
        }

        toposort(&graph, None)
            .map_err(|cycle| TaskError::Cycle(graph[cycle.node_id()].to_string()))?;
        Ok(())
    }

    /// Validate and execute the subgraph reachable from `root`.
    pub async fn run(&self, root: &str) -> Result<()> {
        self.run_sequence(&[root]).await
    }

    /// Execute `roots` in order within one run, stopping at the first failure.
    ///
    /// Nodes shared between roots execute at most once.
    pub async fn run_sequence(&self, roots: &[&str]) -> Result<()> {
        self.validate(roots)?;

        let run = Arc::new(Run {
            tasks: self.tasks.clone(),
            outcomes: self
                .tasks
                .keys()
                .map(|name| (name.clone(), OnceCell::new()))
                .collect(),
            history: Arc::clone(&self.history),
        });

        let clock = Instant::now();
        for root in roots {
            if let Err(e) = execute(Arc::clone(&run), (*root).to_string()).await {
                warn!(
                    root = %root,
                    failed = ?e.failed_tasks(),
                    elapsed_ms = clock.elapsed().as_millis() as u64,
                    "run failed"
                );
                return Err(e);
            }
        }

        info!(
            roots = ?roots,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(())
    }
}

/// State shared by every node of one run.
struct Run {
    tasks: HashMap<String, Arc<Task>>,
    outcomes: HashMap<String, OnceCell<Outcome>>,
    history: Arc<RunHistory>,
}

/// Execute `name` once per run; later callers share the cached outcome.
fn execute(run: Arc<Run>, name: String) -> OutcomeFuture {
    Box::pin(async move {
        let Some(cell) = run.outcomes.get(&name) else {
            return Err(TaskError::UnknownTask {
                name,
                referenced_by: None,
            });
        };
        cell.get_or_init(|| run_node(Arc::clone(&run), name.clone()))
            .await
            .clone()
    })
}

async fn run_node(run: Arc<Run>, name: String) -> Outcome {
    let Some(task) = run.tasks.get(&name).cloned() else {
        return Err(TaskError::UnknownTask {
            name,
            referenced_by: None,
        });
    };

    if !task.predecessors.is_empty() {
        let failures = join_all(&run, &task.predecessors).await;
        if !failures.is_empty() {
            warn!(task = %name, "skipped because a predecessor failed");
            return Err(TaskError::Composite {
                task: name,
                failures,
            });
        }
    }

    match &task.kind {
        TaskKind::Noop => {
            debug!(task = %name, "noop");
            Ok(())
        }
        TaskKind::Series(members) => {
            for member in members {
                if let Err(e) = execute(Arc::clone(&run), member.clone()).await {
                    return Err(TaskError::Composite {
                        task: name,
                        failures: vec![e],
                    });
                }
            }
            Ok(())
        }
        TaskKind::Parallel(members) => {
            let failures = join_all(&run, members).await;
            if failures.is_empty() {
                Ok(())
            } else {
                Err(TaskError::Composite {
                    task: name,
                    failures,
                })
            }
        }
        TaskKind::Action(action) => invoke(&run.history, &task, Arc::clone(action)).await,
    }
}

/// Run `names` concurrently and collect failures in declaration order.
async fn join_all(run: &Arc<Run>, names: &[String]) -> Vec<TaskError> {
    let handles: Vec<_> = names
        .iter()
        .map(|name| tokio::spawn(execute(Arc::clone(run), name.clone())))
        .collect();

    let mut failures = Vec::new();
    for (name, handle) in names.iter().zip(handles) {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(e),
            Err(_) => failures.push(TaskError::Panicked { task: name.clone() }),
        }
    }
    failures
}

async fn invoke(history: &RunHistory, task: &Task, action: Action) -> Outcome {
    let started = Utc::now();
    let since = if task.incremental {
        history.last_success(&task.name)
    } else {
        None
    };

    info!(task = %task.name, since = ?since, "starting");
    let clock = Instant::now();

    let ctx = TaskContext::new(task.name.clone(), since, started);
    match tokio::spawn(action(ctx)).await {
        Ok(Ok(())) => {
            if task.incremental {
                history.record(&task.name, started);
            }
            info!(
                task = %task.name,
                elapsed_ms = clock.elapsed().as_millis() as u64,
                "finished"
            );
            Ok(())
        }
        Ok(Err(source)) => {
            warn!(task = %task.name, error = %source, "failed");
            Err(TaskError::Failed {
                task: task.name.clone(),
                source: Arc::from(source),
            })
        }
        Err(e) => {
            warn!(task = %task.name, error = %e, "panicked");
            Err(TaskError::Panicked {
                task: task.name.clone(),
            })
        }
    }
}
