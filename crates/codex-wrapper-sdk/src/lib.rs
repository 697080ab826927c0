//! Codex subprocess SDK for codex-wrapper.
//!
//! This crate owns everything that touches the outside world on behalf of
//! the wrapper: the async file logger, the newline-delimited JSON event
//! stream parser, and the process supervisor that runs one codex
//! invocation from spawn to classified exit.
//!
//! # Example
//!
//! ```rust,no_run
//! use codex_wrapper_core::TaskSpec;
//! use codex_wrapper_sdk::{CodexExecutor, Logger};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run_one() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = Logger::open()?;
//!     let spec = TaskSpec::new("Summarize the repo layout.");
//!
//!     let executor = CodexExecutor::new();
//!     let result = executor
//!         .run(&spec, logger.handle(), &CancellationToken::new())
//!         .await;
//!
//!     println!("exit={} message={}", result.exit_code, result.message);
//!     logger.close().await?;
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod executor;
pub mod logging;
pub mod tail;

// Re-export main types
pub use events::{parse_stream, CodexEvent, EventItem, StreamOutcome, TextContent};
pub use executor::{build_args, resolve_timeout, should_use_stdin, CodexExecutor, DEFAULT_TIMEOUT};
pub use logging::{LogHandle, LogLevel, Logger, LoggerError, TaskLog};
pub use tail::TailBuffer;
