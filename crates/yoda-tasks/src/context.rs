//! Invocation context passed to task actions.

use chrono::{DateTime, Utc};

/// What an action learns about its own invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    name: String,
    since: Option<DateTime<Utc>>,
    started: DateTime<Utc>,
}

impl TaskContext {
    pub fn new(
        name: impl Into<String>,
        since: Option<DateTime<Utc>>,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            since,
            started,
        }
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start time of this task's last successful run.
    ///
    /// Only set for incremental tasks that have succeeded before. An action
    /// may restrict its work to inputs modified after this instant.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// When this invocation started.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }
}
