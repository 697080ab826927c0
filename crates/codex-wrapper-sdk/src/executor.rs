//! Codex process supervisor.
//!
//! Runs one codex invocation end to end: builds the argument vector,
//! spawns the child with piped stdio, feeds the prompt over stdin when the
//! dispatch heuristic calls for it, parses the stdout event stream while
//! tailing stderr, enforces the deadline, reacts to SIGINT/SIGTERM, and
//! folds everything into a single `TaskResult`.
//!
//! The supervisor is total: it never returns an error, it classifies one.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codex_wrapper_core::task::DEFAULT_WORKDIR;
use codex_wrapper_core::{TaskResult, TaskSpec};

use crate::events::{parse_stream, StreamOutcome};
use crate::logging::{LogHandle, TaskLog};
use crate::tail::{truncate_message, TailBuffer};

/// Default per-task deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7200);

/// Grace period between SIGTERM and SIGKILL when tearing the child down.
pub const FORCE_KILL_DELAY: Duration = Duration::from_secs(5);

/// Bytes of child stderr retained for error reports.
pub const STDERR_TAIL_LIMIT: usize = 4 * 1024;

/// Prompts longer than this go over stdin instead of argv.
const ARG_LENGTH_LIMIT: usize = 800;

/// Characters that push a prompt from argv to stdin dispatch.
const STDIN_SPECIAL_CHARS: &str = "\n\\\"'`$";

/// Log-line truncation for teed child output.
const CHILD_LOG_LINE_LIMIT: usize = 1000;

/// Supervisor for codex invocations.
///
/// One executor can run any number of tasks; per-run state lives on the
/// stack of [`CodexExecutor::run`]. Tests point `command` at a stand-in
/// script instead of patching globals.
#[derive(Debug, Clone)]
pub struct CodexExecutor {
    command: String,
    timeout: Duration,
    force_kill_delay: Duration,
    silent: bool,
}

impl CodexExecutor {
    /// An executor that runs `codex` from PATH with default settings.
    pub fn new() -> Self {
        Self {
            command: "codex".to_string(),
            timeout: DEFAULT_TIMEOUT,
            force_kill_delay: FORCE_KILL_DELAY,
            silent: false,
        }
    }

    /// Override the backend binary (name or path).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Override the per-task deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the SIGTERM-to-SIGKILL grace period.
    pub fn with_force_kill_delay(mut self, delay: Duration) -> Self {
        self.force_kill_delay = delay;
        self
    }

    /// Silent mode: no child stderr forwarding and no per-line output
    /// teeing to the log. Batch workers run silent so their streams don't
    /// interleave on the wrapper's stderr.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Execute one task and classify the outcome.
    ///
    /// Cancelling `cancel` takes the same path as SIGINT: SIGTERM to the
    /// child, SIGKILL after the grace period, exit code 130.
    pub async fn run(&self, spec: &TaskSpec, log: LogHandle, cancel: &CancellationToken) -> TaskResult {
        let log = TaskLog::new(log, &spec.id);

        let use_stdin = spec.use_stdin || should_use_stdin(&spec.task, false);
        let target = if use_stdin { "-" } else { spec.task.as_str() };
        let args = build_args(spec, target);

        log.info(format!(
            "starting codex with args: codex {}...",
            args[..args.len().min(5)].join(" ")
        ));

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .stdin(if use_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log.error("codex command not found in PATH");
                return TaskResult::failure(
                    &spec.id,
                    127,
                    attach_stderr("codex command not found in PATH", ""),
                );
            }
            Err(e) => {
                log.error(format!("failed to start codex: {e}"));
                return TaskResult::failure(
                    &spec.id,
                    1,
                    attach_stderr(&format!("failed to start codex: {e}"), ""),
                );
            }
        };

        if let Some(pid) = child.id() {
            log.info(format!("started codex with PID: {pid}"));
        }

        if use_stdin {
            let Some(mut stdin) = child.stdin.take() else {
                log.error("failed to capture codex stdin");
                return TaskResult::failure(
                    &spec.id,
                    1,
                    attach_stderr("failed to capture codex stdin", ""),
                );
            };
            log.info(format!("writing {} bytes to codex stdin", spec.task.len()));
            let task_text = spec.task.clone();
            let stdin_log = log.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(task_text.as_bytes()).await {
                    stdin_log.warn(format!("stdin write failed: {e}"));
                    return;
                }
                if let Err(e) = stdin.shutdown().await {
                    stdin_log.warn(format!("stdin close failed: {e}"));
                    return;
                }
                stdin_log.info("stdin closed");
            });
        }

        let Some(stdout) = child.stdout.take() else {
            log.error("failed to capture codex stdout");
            return TaskResult::failure(
                &spec.id,
                1,
                attach_stderr("failed to capture codex stdout", ""),
            );
        };
        let Some(stderr) = child.stderr.take() else {
            log.error("failed to capture codex stderr");
            return TaskResult::failure(
                &spec.id,
                1,
                attach_stderr("failed to capture codex stderr", ""),
            );
        };

        let parse_task: JoinHandle<StreamOutcome> =
            tokio::spawn(parse_stream(stdout, log.clone(), !self.silent));
        let stderr_task: JoinHandle<TailBuffer> =
            tokio::spawn(pump_stderr(stderr, log.clone(), self.silent));

        enum WaitOutcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Cancelled,
        }

        let outcome = tokio::select! {
            res = child.wait() => WaitOutcome::Exited(res),
            _ = tokio::time::sleep(self.timeout) => WaitOutcome::TimedOut,
            _ = shutdown_signal(&log) => WaitOutcome::Cancelled,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        match &outcome {
            WaitOutcome::Exited(_) => {}
            WaitOutcome::TimedOut => {
                log.error("codex execution timeout");
                self.terminate(&mut child, &log).await;
            }
            WaitOutcome::Cancelled => {
                log.error("execution cancelled, terminating codex process");
                self.terminate(&mut child, &log).await;
            }
        }

        // The parser runs to EOF once the child is gone; both helpers must
        // finish before the result is assembled.
        let parsed = match parse_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log.warn(format!("stdout parser task failed: {e}"));
                StreamOutcome::default()
            }
        };
        let tail = match stderr_task.await {
            Ok(tail) => tail.contents(),
            Err(_) => String::new(),
        };

        match outcome {
            WaitOutcome::TimedOut => {
                TaskResult::failure(&spec.id, 124, attach_stderr("codex execution timeout", &tail))
            }
            WaitOutcome::Cancelled => {
                TaskResult::failure(&spec.id, 130, attach_stderr("execution cancelled", &tail))
            }
            WaitOutcome::Exited(Err(e)) => {
                log.error(format!("codex error: {e}"));
                TaskResult::failure(&spec.id, 1, attach_stderr(&format!("codex error: {e}"), &tail))
            }
            WaitOutcome::Exited(Ok(status)) if !status.success() => {
                let code = normalize_exit(status);
                log.error(format!("codex exited with status {code}"));
                TaskResult::failure(
                    &spec.id,
                    code,
                    attach_stderr(&format!("codex exited with status {code}"), &tail),
                )
            }
            WaitOutcome::Exited(Ok(_)) => {
                if parsed.message.is_empty() {
                    log.error("codex completed without agent_message output");
                    return TaskResult::failure(
                        &spec.id,
                        1,
                        attach_stderr("codex completed without agent_message output", &tail),
                    );
                }
                TaskResult::success(&spec.id, parsed.message, parsed.thread_id)
            }
        }
    }

    /// Graceful teardown: SIGTERM, then SIGKILL after the grace period.
    /// The child is reaped before returning.
    async fn terminate(&self, child: &mut Child, log: &TaskLog) {
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        if tokio::time::timeout(self.force_kill_delay, child.wait())
            .await
            .is_err()
        {
            log.warn("codex ignored SIGTERM, sending SIGKILL");
            let _ = child.kill().await;
        }
    }
}

impl Default for CodexExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the per-task deadline from `CODEX_TIMEOUT`.
///
/// Values up to 10000 are seconds; larger values are milliseconds. Unset
/// means the 7200 s default; anything unparseable logs a warning and
/// falls back to the default.
pub fn resolve_timeout(log: &LogHandle) -> Duration {
    let Ok(raw) = std::env::var("CODEX_TIMEOUT") else {
        return DEFAULT_TIMEOUT;
    };
    if raw.is_empty() {
        return DEFAULT_TIMEOUT;
    }

    match raw.parse::<i64>() {
        Ok(value) if value > 0 => {
            if value > 10000 {
                Duration::from_millis(value as u64)
            } else {
                Duration::from_secs(value as u64)
            }
        }
        _ => {
            log.warn(format!(
                "invalid CODEX_TIMEOUT '{raw}', falling back to {}s",
                DEFAULT_TIMEOUT.as_secs()
            ));
            DEFAULT_TIMEOUT
        }
    }
}

/// Decide between argv and stdin dispatch for a prompt.
///
/// Stdin wins for piped input, prompts over 800 bytes, and prompts with
/// characters that are unsafe as a single CLI argument.
pub fn should_use_stdin(task: &str, piped: bool) -> bool {
    if piped {
        return true;
    }
    if task.len() > ARG_LENGTH_LIMIT {
        return true;
    }
    task.chars().any(|c| STDIN_SPECIAL_CHARS.contains(c))
}

/// Build the codex argument vector for a task.
pub fn build_args(spec: &TaskSpec, target: &str) -> Vec<String> {
    if let Some(session_id) = &spec.session_id {
        return vec![
            "e".to_string(),
            "--skip-git-repo-check".to_string(),
            "--json".to_string(),
            "resume".to_string(),
            session_id.clone(),
            target.to_string(),
        ];
    }

    let workdir = if spec.workdir.is_empty() {
        DEFAULT_WORKDIR
    } else {
        spec.workdir.as_str()
    };
    vec![
        "e".to_string(),
        "--skip-git-repo-check".to_string(),
        "-C".to_string(),
        workdir.to_string(),
        "--json".to_string(),
        target.to_string(),
    ]
}

fn attach_stderr(message: &str, tail: &str) -> String {
    format!("{message}; stderr: {tail}")
}

/// Map an exit status to a code: the child's own code, or 128+signal for
/// a signal death.
fn normalize_exit(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            code
        } else if let Some(sig) = status.signal() {
            128 + sig
        } else {
            1
        }
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

/// Resolves when the wrapper receives SIGINT or SIGTERM.
async fn shutdown_signal(log: &TaskLog) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(i), Ok(t)) => (i, t),
        _ => {
            log.warn("failed to install signal handlers");
            return std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

/// Drain child stderr: capture the rolling tail, tee lines into the log,
/// and (unless silent) forward the raw stream to the wrapper's stderr.
async fn pump_stderr<R>(mut reader: R, log: TaskLog, silent: bool) -> TailBuffer
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut tail = TailBuffer::new(STDERR_TAIL_LIMIT);
    let mut own_stderr = tokio::io::stderr();
    let mut buf = vec![0u8; 8 * 1024];
    let mut line_buf: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log.warn(format!("read stderr error: {e}"));
                break;
            }
        };
        let chunk = &buf[..n];
        tail.push(chunk);

        if !silent {
            let _ = own_stderr.write_all(chunk).await;
            let _ = own_stderr.flush().await;

            line_buf.extend_from_slice(chunk);
            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = line_buf.drain(..=pos).collect();
                log_stderr_line(&log, &line[..line.len() - 1]);
            }
        }
    }

    if !silent && !line_buf.is_empty() {
        log_stderr_line(&log, &line_buf);
    }

    tail
}

fn log_stderr_line(log: &TaskLog, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\r');
    log.info(format!(
        "CODEX_STDERR: {}",
        truncate_message(text, CHILD_LOG_LINE_LIMIT)
    ));
}
