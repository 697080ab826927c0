//! Invocation grammar.
//!
//! ```text
//! codex-wrapper "task" [workdir]
//! codex-wrapper - [workdir]                     task read from stdin
//! codex-wrapper resume <session_id> "task" [workdir]
//! codex-wrapper resume <session_id> - [workdir]
//! codex-wrapper --parallel                      batch config from stdin
//! codex-wrapper --version | -v
//! codex-wrapper --help    | -h
//! ```

use clap::{ArgAction, Parser, Subcommand};

/// Wrapper around the codex CLI: runs one task, resumes sessions, or
/// executes a dependency-ordered task batch in parallel.
#[derive(Debug, Parser)]
#[command(
    name = "codex-wrapper",
    version,
    disable_version_flag = true,
    args_conflicts_with_subcommands = true,
    after_help = "Exit codes:\n  \
        0    success\n  \
        1    configuration or runtime failure\n  \
        124  codex exceeded the timeout\n  \
        127  codex binary not found\n  \
        130  interrupted by signal\n  \
        *    codex's own exit code passed through\n\n\
        CODEX_TIMEOUT sets the per-task deadline: seconds when <= 10000, \
        milliseconds otherwise."
)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Run tasks from a batch config read from stdin
    #[arg(long)]
    pub parallel: bool,

    /// Task prompt, or "-" to read the task from stdin
    #[arg(allow_hyphen_values = true)]
    pub task: Option<String>,

    /// Working directory passed to codex
    pub workdir: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resume an existing codex session
    Resume {
        /// Session id printed by an earlier run
        session_id: String,

        /// Task prompt, or "-" to read the task from stdin
        #[arg(allow_hyphen_values = true)]
        task: String,

        /// Working directory passed to codex
        workdir: Option<String>,
    },
}

/// What one invocation asks for, after validation.
#[derive(Debug, PartialEq)]
pub enum Invocation {
    /// Run a single task (optionally resuming a session).
    Single {
        task: String,
        workdir: Option<String>,
        session_id: Option<String>,
    },

    /// Run a batch from stdin.
    Parallel,
}

impl Cli {
    /// Validate the parsed arguments into an invocation.
    pub fn into_invocation(self) -> Result<Invocation, String> {
        if self.parallel {
            if self.task.is_some() || self.workdir.is_some() {
                return Err(
                    "--parallel reads its task configuration from stdin and does not accept \
                     additional arguments.\nUsage examples:\n  codex-wrapper --parallel < tasks.txt\n  \
                     echo '...' | codex-wrapper --parallel"
                        .to_string(),
                );
            }
            return Ok(Invocation::Parallel);
        }

        if let Some(Command::Resume {
            session_id,
            task,
            workdir,
        }) = self.command
        {
            return Ok(Invocation::Single {
                task,
                workdir,
                session_id: Some(session_id),
            });
        }

        let Some(task) = self.task else {
            return Err("task required".to_string());
        };
        Ok(Invocation::Single {
            task,
            workdir: self.workdir,
            session_id: None,
        })
    }
}
