//! Yoda Tasks Library
//!
//! A named task graph for build orchestration.
//!
//! # Modules
//!
//! - [`task`] - Task nodes: actions, series/parallel composites, no-ops
//! - [`graph`] - Registration, validation and memoized execution
//! - [`context`] - Invocation context handed to actions
//! - [`history`] - Last-success timestamps for incremental runs
//! - [`error`] - Task failures
//!
//! # Example
//!
//! ```no_run
//! use yoda_tasks::{TaskGraph, TaskContext};
//!
//! # async fn demo() -> Result<(), yoda_tasks::TaskError> {
//! let mut graph = TaskGraph::new();
//! graph.register("clean", &[], |_ctx: TaskContext| async { Ok(()) })?;
//! graph.register("compile", &[], |_ctx: TaskContext| async { Ok(()) })?;
//! graph.series("build", &["clean", "compile"])?;
//! graph.run("build").await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod graph;
pub mod history;
pub mod task;

pub use context::TaskContext;
pub use error::{Result, TaskError};
pub use graph::TaskGraph;
pub use history::RunHistory;
pub use task::{ActionFuture, ActionResult, BoxError, Task, TaskKind};
