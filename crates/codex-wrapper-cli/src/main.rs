//! codex-wrapper entry point.
//!
//! Single-task mode supervises one codex run and prints the final agent
//! message plus the session id. Batch mode (`--parallel`) reads a task
//! config from stdin, schedules it into dependency layers, runs the
//! layers concurrently, and prints a consolidated report.

use std::io::IsTerminal;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use codex_wrapper_core::{final_exit_code, parse_batch, plan_layers, render_summary, TaskSpec};
use codex_wrapper_sdk::{
    resolve_timeout, should_use_stdin, CodexExecutor, LogHandle, Logger,
};

mod args;
mod parallel;

use args::{Cli, Invocation};

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    // --help and --version are handled before the logger exists.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return 0;
        }
        Err(e) => {
            let _ = e.print();
            return 1;
        }
    };

    let logger = match Logger::open() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("ERROR: failed to initialize logger: {e}");
            return 1;
        }
    };

    let code = match cli.into_invocation() {
        Ok(Invocation::Parallel) => run_parallel(logger.handle()).await,
        Ok(Invocation::Single {
            task,
            workdir,
            session_id,
        }) => run_single(task, workdir, session_id, &logger).await,
        Err(message) => {
            eprintln!("ERROR: {message}");
            logger.handle().error(message);
            1
        }
    };

    logger.flush().await;
    if let Err(e) = logger.close().await {
        eprintln!("ERROR: failed to close logger: {e}");
    }
    // The log file is kept for diagnostics; see Logger::remove_log_file.

    code
}

/// Batch mode: stdin config -> layers -> concurrent execution -> report.
async fn run_parallel(log: LogHandle) -> i32 {
    let mut input = Vec::new();
    if let Err(e) = tokio::io::stdin().read_to_end(&mut input).await {
        eprintln!("ERROR: failed to read stdin: {e}");
        return 1;
    }

    let tasks = match parse_batch(&String::from_utf8_lossy(&input)) {
        Ok(tasks) => tasks,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 1;
        }
    };

    let timeout = resolve_timeout(&log);
    log.info(format!(
        "parallel mode: {} tasks, timeout {}s",
        tasks.len(),
        timeout.as_secs()
    ));

    let layers = match plan_layers(tasks) {
        Ok(layers) => layers,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 1;
        }
    };

    let executor = CodexExecutor::new().with_timeout(timeout).silent(true);
    let results = parallel::run_layers(layers, executor, log).await;

    println!("{}", render_summary(&results));
    final_exit_code(&results)
}

/// Single-task mode: one supervised codex run, message to stdout.
async fn run_single(
    task_arg: String,
    workdir: Option<String>,
    session_id: Option<String>,
    logger: &Logger,
) -> i32 {
    let log = logger.handle();

    eprintln!("[codex-wrapper]");
    eprintln!(
        "  Command: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    eprintln!("  PID: {}", std::process::id());
    eprintln!("  Log: {}", logger.path().display());

    log.info("wrapper started");

    let explicit_stdin = task_arg == "-";
    let timeout = resolve_timeout(&log);
    log.info(format!("timeout: {}s", timeout.as_secs()));

    let (task_text, piped) = if explicit_stdin {
        log.info("explicit stdin mode: reading task from stdin");
        let text = match read_stdin_task().await {
            Ok(text) => text,
            Err(e) => {
                eprintln!("ERROR: failed to read stdin: {e}");
                log.error(format!("failed to read stdin: {e}"));
                return 1;
            }
        };
        if text.is_empty() {
            eprintln!("ERROR: explicit stdin mode requires task input from stdin");
            log.error("explicit stdin mode requires task input from stdin");
            return 1;
        }
        (text, !std::io::stdin().is_terminal())
    } else if std::io::stdin().is_terminal() {
        log.info("stdin is a tty, skipping pipe read");
        (task_arg, false)
    } else {
        // A piped prompt replaces the positional task argument.
        match read_stdin_task().await {
            Ok(text) if !text.is_empty() => {
                log.info(format!("read {} bytes from stdin pipe", text.len()));
                (text, true)
            }
            Ok(_) => {
                log.info("stdin pipe returned empty data");
                (task_arg, false)
            }
            Err(e) => {
                eprintln!("ERROR: failed to read piped stdin: {e}");
                log.error(format!("failed to read piped stdin: {e}"));
                return 1;
            }
        }
    };

    let use_stdin = explicit_stdin || should_use_stdin(&task_text, piped);
    if use_stdin {
        log_stdin_reasons(&log, &task_text, piped, explicit_stdin);
    }
    log.info(format!(
        "parsed args: mode={}, task_len={}",
        if session_id.is_some() { "resume" } else { "new" },
        task_text.len()
    ));

    let mut spec = TaskSpec::new(task_text);
    if let Some(workdir) = workdir {
        spec = spec.with_workdir(workdir);
    }
    if let Some(session_id) = session_id {
        spec = spec.with_session_id(session_id);
    }
    if use_stdin {
        spec = spec.with_stdin();
    }

    log.info("codex running...");
    let executor = CodexExecutor::new().with_timeout(timeout);
    let result = executor.run(&spec, log, &CancellationToken::new()).await;

    if result.exit_code != 0 {
        return result.exit_code;
    }

    println!("{}", result.message);
    if !result.session_id.is_empty() {
        println!("\n---\nSESSION_ID: {}", result.session_id);
    }

    0
}

async fn read_stdin_task() -> std::io::Result<String> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;
    Ok(String::from_utf8_lossy(&input).into_owned())
}

/// Record why stdin dispatch was chosen; useful when a prompt behaves
/// differently than the caller expected.
fn log_stdin_reasons(log: &LogHandle, task: &str, piped: bool, explicit: bool) {
    let mut reasons = Vec::new();
    if piped {
        reasons.push("piped input");
    }
    if explicit {
        reasons.push("explicit \"-\"");
    }
    if task.contains('\n') {
        reasons.push("newline");
    }
    if task.contains('\\') {
        reasons.push("backslash");
    }
    if task.contains('"') {
        reasons.push("double-quote");
    }
    if task.contains('\'') {
        reasons.push("single-quote");
    }
    if task.contains('`') {
        reasons.push("backtick");
    }
    if task.contains('$') {
        reasons.push("dollar");
    }
    if task.len() > 800 {
        reasons.push("length>800");
    }
    if !reasons.is_empty() {
        log.warn(format!(
            "using stdin mode for task due to: {}",
            reasons.join(", ")
        ));
    }
}
