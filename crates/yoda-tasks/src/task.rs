//! Task nodes.

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use crate::context::TaskContext;

/// Error type returned by task actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a task action.
pub type ActionResult = std::result::Result<(), BoxError>;

/// Future returned by a task action.
pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send>>;

/// Shared, type-erased task action.
pub type Action = Arc<dyn Fn(TaskContext) -> ActionFuture + Send + Sync>;

/// What a node does when it runs.
#[derive(Clone)]
pub enum TaskKind {
    /// Run a user action.
    Action(Action),
    /// Run members one after another, stopping at the first failure.
    Series(Vec<String>),
    /// Run members concurrently and collect every failure.
    Parallel(Vec<String>),
    /// Succeed immediately.
    Noop,
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(_) => f.write_str("Action"),
            Self::Series(members) => f.debug_tuple("Series").field(members).finish(),
            Self::Parallel(members) => f.debug_tuple("Parallel").field(members).finish(),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

/// A named unit of work in the build graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) name: String,
    pub(crate) kind: TaskKind,
    pub(crate) predecessors: Vec<String>,
    pub(crate) incremental: bool,
    pub(crate) description: Option<String>,
}

impl Task {
    fn with_kind(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            predecessors: Vec::new(),
            incremental: false,
            description: None,
        }
    }

    /// A task running `action`.
    pub fn action<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let action: Action =
            Arc::new(move |ctx: TaskContext| -> ActionFuture { Box::pin(action(ctx)) });
        Self::with_kind(name, TaskKind::Action(action))
    }

    /// A composite running `members` in order.
    pub fn series<S: Into<String>>(
        name: impl Into<String>,
        members: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::with_kind(
            name,
            TaskKind::Series(members.into_iter().map(Into::into).collect()),
        )
    }

    /// A composite running `members` concurrently.
    pub fn parallel<S: Into<String>>(
        name: impl Into<String>,
        members: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::with_kind(
            name,
            TaskKind::Parallel(members.into_iter().map(Into::into).collect()),
        )
    }

    /// A placeholder that always succeeds.
    pub fn noop(name: impl Into<String>) -> Self {
        Self::with_kind(name, TaskKind::Noop)
    }

    /// Declare nodes that must succeed before this one starts.
    #[must_use]
    pub fn after<S: Into<String>>(mut self, predecessors: impl IntoIterator<Item = S>) -> Self {
        self.predecessors
            .extend(predecessors.into_iter().map(Into::into));
        self
    }

    /// Hand the action the time of its last success on every run.
    #[must_use]
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    /// Attach a human readable description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    pub fn predecessors(&self) -> &[String] {
        &self.predecessors
    }

    /// Every node this one refers to: predecessors first, then members.
    pub(crate) fn references(&self) -> impl Iterator<Item = &String> {
        let members: &[String] = match &self.kind {
            TaskKind::Series(members) | TaskKind::Parallel(members) => members,
            TaskKind::Action(_) | TaskKind::Noop => &[],
        };
        self.predecessors.iter().chain(members.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let task = Task::action("compile", |_ctx| async { Ok(()) })
            .after(["metadata"])
            .incremental()
            .describe("compile content");

        assert_eq!(task.name(), "compile");
        assert!(task.is_incremental());
        assert_eq!(task.predecessors(), ["metadata".to_string()]);
        assert_eq!(task.description(), Some("compile content"));
        assert!(matches!(task.kind(), TaskKind::Action(_)));
    }

    #[test]
    fn test_references_include_members_and_predecessors() {
        let task = Task::series("build", ["clean", "compile"]).after(["fetch"]);
        let refs: Vec<_> = task.references().cloned().collect();
        assert_eq!(refs, vec!["fetch", "clean", "compile"]);
    }

    #[test]
    fn test_debug_hides_action() {
        let task = Task::action("a", |_ctx| async { Ok(()) });
        assert!(format!("{task:?}").contains("Action"));
        assert_eq!(format!("{:?}", Task::noop("n").kind()), "Noop");
    }
}
