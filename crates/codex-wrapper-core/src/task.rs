//! Task and result types.

use serde::{Deserialize, Serialize};

/// Default working directory for a task when none is configured.
pub const DEFAULT_WORKDIR: &str = ".";

/// Description of one unit of backend work.
///
/// A spec is created by the batch parser (or assembled by the CLI in
/// single-task mode), read-only afterwards, and consumed exactly once by
/// the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task identifier, unique within a batch. Empty in single-task mode.
    pub id: String,

    /// The prompt text. Arbitrary bytes; may contain newlines and shell
    /// metacharacters.
    pub task: String,

    /// Working directory passed to the backend.
    pub workdir: String,

    /// Ids of tasks that must complete successfully before this one starts.
    pub dependencies: Vec<String>,

    /// Backend session to resume. `Some` switches the invocation to resume
    /// mode.
    pub session_id: Option<String>,

    /// Deliver the prompt on the child's stdin instead of as an argument.
    pub use_stdin: bool,
}

impl TaskSpec {
    /// Create a spec for a fresh backend run in the default workdir.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            task: task.into(),
            workdir: DEFAULT_WORKDIR.to_string(),
            dependencies: Vec::new(),
            session_id: None,
            use_stdin: false,
        }
    }

    /// Builder method to set the task id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to set the working directory.
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Builder method to set the session to resume.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Builder method to force stdin dispatch.
    pub fn with_stdin(mut self) -> Self {
        self.use_stdin = true;
        self
    }

    /// True when the spec resumes an existing backend session.
    pub fn is_resume(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Outcome of one task.
///
/// Exactly one result is produced per spec, either by the supervisor or by
/// the executor synthesizing a skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the spec this result belongs to.
    pub task_id: String,

    /// Process-style exit code; see the exit-code table in the CLI help.
    pub exit_code: i32,

    /// Final agent message, empty on failure.
    pub message: String,

    /// Backend-assigned session id, empty if none was observed.
    pub session_id: String,

    /// Human-readable failure description, empty on success.
    pub error: String,
}

impl TaskResult {
    /// A successful result carrying the final message and session id.
    pub fn success(
        task_id: impl Into<String>,
        message: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            exit_code: 0,
            message: message.into(),
            session_id: session_id.into(),
            error: String::new(),
        }
    }

    /// A failed result with the given exit code and error description.
    pub fn failure(task_id: impl Into<String>, exit_code: i32, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            exit_code,
            message: String::new(),
            session_id: String::new(),
            error: error.into(),
        }
    }

    /// A task succeeded iff it exited zero and reported no error.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_empty()
    }
}
