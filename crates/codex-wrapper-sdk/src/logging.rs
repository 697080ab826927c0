//! Async file logger.
//!
//! A bounded mpsc channel feeds a single writer task that owns the log
//! file. Producers never block: when the queue is full or the logger is
//! closing, the entry is dropped. One log file per process lives under the
//! OS temp directory as `codex-wrapper-<pid>[-<suffix>].log` and is kept
//! after exit so failed runs can be inspected.
//!
//! Records look like:
//!
//! ```text
//! [2025-11-03 14:21:07.103] [PID:4242] INFO: codex running...
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

/// Queue capacity; entries past this are dropped rather than blocking.
const QUEUE_CAPACITY: usize = 1000;

/// How often the writer flushes its buffer to disk on its own.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on how long an explicit flush may wait.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how long close waits for the writer to drain.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from opening or closing the logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log file could not be created.
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The writer task did not drain within the close deadline.
    #[error("logger writer timeout during close")]
    CloseTimeout,

    /// The final flush/sync of the log file failed.
    #[error("failed to finalize log file: {0}")]
    Finalize(#[from] std::io::Error),

    /// The writer task aborted or panicked.
    #[error("logger writer task failed: {0}")]
    Writer(String),
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Debug,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Debug => "DEBUG",
            Self::Error => "ERROR",
        }
    }
}

enum Command {
    Record {
        level: LogLevel,
        message: String,
        timestamp: DateTime<Local>,
    },
    // Flush sits in the same queue as records, so by the time it is
    // handled everything submitted before it is on disk.
    Flush(oneshot::Sender<()>),
}

/// Cheap cloneable producer handle.
///
/// Components receive a `LogHandle` instead of reaching for a process
/// global. Logging through a handle never blocks and never fails; entries
/// are dropped when the queue is full or the logger has closed.
#[derive(Clone)]
pub struct LogHandle {
    tx: Option<mpsc::Sender<Command>>,
    closed: Arc<AtomicBool>,
}

impl LogHandle {
    /// A handle that discards everything. Useful in tests and as a default.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            closed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Submit one record. Non-blocking; drops on full queue or closed logger.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let Some(tx) = &self.tx else { return };
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = tx.try_send(Command::Record {
            level,
            message: message.into(),
            timestamp: Local::now(),
        });
    }

    /// Log at INFO level.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Log at WARN level.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at DEBUG level.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at ERROR level.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

/// A `LogHandle` wrapper that prefixes every record with `[Task: <id>] `.
///
/// Batch workers use this so interleaved task logs stay attributable; an
/// empty task id produces no prefix (single-task mode).
#[derive(Clone)]
pub struct TaskLog {
    handle: LogHandle,
    prefix: String,
}

impl TaskLog {
    pub fn new(handle: LogHandle, task_id: &str) -> Self {
        let prefix = if task_id.is_empty() {
            String::new()
        } else {
            format!("[Task: {task_id}] ")
        };
        Self { handle, prefix }
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.handle
            .log(level, format!("{}{}", self.prefix, message.as_ref()));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }
}

/// Owner of the log file and the writer task.
///
/// Must be created inside a tokio runtime. Producers log through cloned
/// [`LogHandle`]s; the `Logger` itself is what gets flushed and closed at
/// the end of the process.
pub struct Logger {
    path: PathBuf,
    handle: LogHandle,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
    writer: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl Logger {
    /// Open the per-process log file and start the writer task.
    pub fn open() -> Result<Self, LoggerError> {
        Self::open_with_suffix("")
    }

    /// Open a log file with a filename suffix.
    ///
    /// Tests use distinct suffixes so loggers in one process don't share a
    /// file.
    pub fn open_with_suffix(suffix: &str) -> Result<Self, LoggerError> {
        let mut filename = format!("codex-wrapper-{}", std::process::id());
        if !suffix.is_empty() {
            filename.push('-');
            filename.push_str(suffix);
        }
        filename.push_str(".log");
        let path = std::env::temp_dir().join(filename);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LoggerError::Open {
                path: path.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let shutdown = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(run_writer(
            tokio::fs::File::from_std(file),
            rx,
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            path,
            handle: LogHandle {
                tx: Some(tx),
                closed: Arc::clone(&closed),
            },
            shutdown,
            closed,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A producer handle for this logger.
    pub fn handle(&self) -> LogHandle {
        self.handle.clone()
    }

    /// Wait until everything submitted so far is flushed and synced.
    ///
    /// Bounded: gives up silently after a few seconds rather than stalling
    /// the caller.
    pub async fn flush(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let Some(tx) = &self.handle.tx else { return };

        let (ack_tx, ack_rx) = oneshot::channel();
        match tokio::time::timeout(FLUSH_TIMEOUT, tx.send(Command::Flush(ack_tx))).await {
            Ok(Ok(())) => {
                let _ = tokio::time::timeout(FLUSH_TIMEOUT, ack_rx).await;
            }
            // Queue send timed out or the writer is gone; nothing to wait on.
            _ => {}
        }
    }

    /// Stop the writer, drain queued records, and close the file.
    ///
    /// Idempotent; later calls return `Ok(())` without touching the file
    /// again. If the writer does not drain within the deadline, close
    /// proceeds and reports [`LoggerError::CloseTimeout`].
    pub async fn close(&self) -> Result<(), LoggerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.notify_one();

        let Some(writer) = self.writer.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, writer).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(LoggerError::Finalize(e)),
            Ok(Err(join_err)) => Err(LoggerError::Writer(join_err.to_string())),
            Err(_) => Err(LoggerError::CloseTimeout),
        }
    }

    /// Delete the log file. The file is kept by default; callers that want
    /// cleanup do it explicitly, after `close`.
    pub fn remove_log_file(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

async fn run_writer(
    file: tokio::fs::File,
    mut rx: mpsc::Receiver<Command>,
    shutdown: Arc<Notify>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::with_capacity(4096, file);
    let mut tick = tokio::time::interval(FLUSH_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(cmd) => handle_command(&mut writer, cmd).await,
                // Every sender dropped; treat like shutdown.
                None => break,
            },
            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
            _ = shutdown.notified() => {
                // Drain whatever was queued before close.
                while let Ok(cmd) = rx.try_recv() {
                    handle_command(&mut writer, cmd).await;
                }
                break;
            }
        }
    }

    writer.flush().await?;
    writer.get_ref().sync_all().await?;
    Ok(())
}

async fn handle_command(writer: &mut BufWriter<tokio::fs::File>, cmd: Command) {
    match cmd {
        Command::Record {
            level,
            message,
            timestamp,
        } => {
            let line = format!(
                "[{}] [PID:{}] {}: {}\n",
                timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                std::process::id(),
                level.as_str(),
                message
            );
            // Write failures must never take the wrapper down.
            let _ = writer.write_all(line.as_bytes()).await;
        }
        Command::Flush(ack) => {
            let _ = writer.flush().await;
            let _ = writer.get_ref().sync_all().await;
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_lines(logger: &Logger) -> Vec<String> {
        let text = tokio::fs::read_to_string(logger.path()).await.expect("read log");
        text.lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_open_names_file_after_pid_and_suffix() {
        let logger = Logger::open_with_suffix("naming").expect("open");
        let name = logger.path().file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(
            name,
            format!("codex-wrapper-{}-naming.log", std::process::id())
        );
        assert!(logger.path().exists());

        logger.close().await.expect("close");
        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_records_are_formatted_and_ordered() {
        let logger = Logger::open_with_suffix("format").expect("open");
        let log = logger.handle();

        log.info("first");
        log.warn("second");
        log.error("third");
        log.debug("fourth");
        logger.flush().await;

        let lines = read_lines(&logger).await;
        assert_eq!(lines.len(), 4);

        let pid_tag = format!("[PID:{}]", std::process::id());
        assert!(lines[0].contains(&pid_tag));
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("INFO: first"));
        assert!(lines[1].ends_with("WARN: second"));
        assert!(lines[2].ends_with("ERROR: third"));
        assert!(lines[3].ends_with("DEBUG: fourth"));

        // [YYYY-MM-DD HH:MM:SS.mmm] is 25 chars including brackets.
        assert_eq!(lines[0].as_bytes()[24], b']');

        logger.close().await.expect("close");
        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let logger = Logger::open_with_suffix("idempotent").expect("open");
        logger.handle().info("one entry");

        logger.close().await.expect("first close");
        logger.close().await.expect("second close");
        logger.close().await.expect("third close");

        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_log_after_close_is_dropped() {
        let logger = Logger::open_with_suffix("after-close").expect("open");
        let log = logger.handle();

        log.info("kept");
        logger.flush().await;
        logger.close().await.expect("close");

        log.info("dropped");
        log.error("also dropped");

        let lines = read_lines(&logger).await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("INFO: kept"));

        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_close_drains_queued_records() {
        let logger = Logger::open_with_suffix("drain").expect("open");
        let log = logger.handle();

        for i in 0..50 {
            log.info(format!("entry {i}"));
        }
        logger.close().await.expect("close");

        let lines = read_lines(&logger).await;
        assert_eq!(lines.len(), 50);
        assert!(lines[49].ends_with("INFO: entry 49"));

        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_task_log_prefixes_records() {
        let logger = Logger::open_with_suffix("prefix").expect("open");
        let task_log = TaskLog::new(logger.handle(), "build");
        let plain_log = TaskLog::new(logger.handle(), "");

        task_log.info("compiling");
        plain_log.info("no prefix");
        logger.flush().await;

        let lines = read_lines(&logger).await;
        assert!(lines[0].ends_with("INFO: [Task: build] compiling"));
        assert!(lines[1].ends_with("INFO: no prefix"));

        logger.close().await.expect("close");
        logger.remove_log_file().expect("remove");
    }

    #[tokio::test]
    async fn test_disabled_handle_discards_silently() {
        let log = LogHandle::disabled();
        log.info("nowhere");
        log.error("also nowhere");
    }

    #[tokio::test]
    async fn test_flush_after_close_returns_immediately() {
        let logger = Logger::open_with_suffix("flush-closed").expect("open");
        logger.close().await.expect("close");

        // Must not hang on the stopped writer.
        logger.flush().await;

        logger.remove_log_file().expect("remove");
    }
}
