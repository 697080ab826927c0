//! Codex Wrapper Core Domain Types
//!
//! This crate contains the pure domain side of the wrapper with no
//! dependencies on:
//! - The tokio runtime
//! - Subprocess management
//! - The filesystem
//!
//! It covers the batch task model, the `---TASK---` config grammar, the
//! dependency scheduler, and the consolidated result report.

pub mod batch;
pub mod error;
pub mod report;
pub mod schedule;
pub mod task;

// Re-export commonly used types
pub use batch::{parse_batch, render_batch};
pub use error::CoreError;
pub use report::{final_exit_code, render_summary};
pub use schedule::plan_layers;
pub use task::{TaskResult, TaskSpec};
