//! Core domain errors.

use thiserror::Error;

/// Errors produced while parsing or scheduling a task batch.
///
/// All of these are configuration errors: nothing has been launched when
/// one is returned, and the process should exit with code 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The batch config read from stdin was empty.
    #[error("parallel config is empty")]
    EmptyConfig,

    /// A task block had no `---CONTENT---` separator.
    #[error("task block missing ---CONTENT--- separator")]
    MissingContentSeparator,

    /// A task block had no `id:` metadata line.
    #[error("task missing id field")]
    MissingTaskId,

    /// A task block had an empty body after `---CONTENT---`.
    #[error("task {id:?} missing content")]
    EmptyTaskContent { id: String },

    /// Two task blocks declared the same id.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// The config contained separators but no task blocks.
    #[error("no tasks found")]
    NoTasks,

    /// A task depends on an id that is not in the batch.
    #[error("dependency {dependency:?} not found for task {task:?}")]
    UnknownDependency { dependency: String, task: String },

    /// The dependency graph contains a cycle.
    ///
    /// `ids` holds every task left with unsatisfied dependencies, sorted
    /// for deterministic output.
    #[error("cycle detected involving tasks: {}", ids.join(","))]
    CycleDetected { ids: Vec<String> },
}
