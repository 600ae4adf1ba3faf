//! Task failures.

use std::sync::Arc;

use thiserror::Error;

/// Result type for task graph operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// A task graph failure, always attributed to a named node.
///
/// Errors are cheap to clone so one outcome can be shared by every composite
/// that references the failing node.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// An action returned an error.
    #[error("task '{task}' failed: {source}")]
    Failed {
        task: String,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// An action panicked or was cancelled by the runtime.
    #[error("task '{task}' panicked")]
    Panicked { task: String },

    /// A composite, or a node whose predecessors failed.
    #[error("task '{task}' failed because of {}", describe_failures(.failures))]
    Composite {
        task: String,
        failures: Vec<TaskError>,
    },

    /// A task name that was never registered.
    #[error("unknown task '{name}'{}", referenced_by_suffix(.referenced_by))]
    UnknownTask {
        name: String,
        referenced_by: Option<String>,
    },

    /// The graph reachable from a root is not acyclic.
    #[error("task graph has a cycle through '{0}'")]
    Cycle(String),

    /// A task with this name is already registered.
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),
}

impl TaskError {
    /// Wrap an action error.
    pub fn failed(
        task: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Failed {
            task: task.into(),
            source: Arc::from(source.into()),
        }
    }

    /// Name of the node this error is reported for.
    pub fn task(&self) -> &str {
        match self {
            Self::Failed { task, .. }
            | Self::Panicked { task }
            | Self::Composite { task, .. } => task,
            Self::UnknownTask { name, .. } | Self::Cycle(name) | Self::DuplicateTask(name) => name,
        }
    }

    /// Names of the nodes where failures originated, in report order.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.root_causes().into_iter().map(TaskError::task).collect()
    }

    /// Leaf errors underneath any composite nesting.
    pub fn root_causes(&self) -> Vec<&TaskError> {
        match self {
            Self::Composite { failures, .. } => {
                failures.iter().flat_map(TaskError::root_causes).collect()
            }
            other => vec![other],
        }
    }
}

fn describe_failures(failures: &[TaskError]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for failure in failures {
        for name in failure.failed_tasks() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn referenced_by_suffix(referenced_by: &Option<String>) -> String {
    referenced_by
        .as_ref()
        .map(|parent| format!(" (referenced by '{parent}')"))
        .unwrap_or_default()
}
