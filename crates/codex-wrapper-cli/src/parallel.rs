//! Concurrent layer execution.
//!
//! Layers come pre-ordered from the scheduler. Every task in a layer runs
//! on its own worker; the layer barrier (joining all workers) is what
//! gives downstream tasks their happens-before guarantee. A failure never
//! aborts unrelated tasks, it only converts transitive dependents into
//! skips.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use codex_wrapper_core::{TaskResult, TaskSpec};
use codex_wrapper_sdk::{CodexExecutor, LogHandle};

/// Run all layers to completion and return one result per input spec.
///
/// Results are grouped by layer; within a layer they come back in spawn
/// order. A worker panic becomes a failure result for that task, not a
/// process abort.
pub async fn run_layers(
    layers: Vec<Vec<TaskSpec>>,
    executor: CodexExecutor,
    log: LogHandle,
) -> Vec<TaskResult> {
    let total: usize = layers.iter().map(Vec::len).sum();
    let executor = Arc::new(executor);

    let mut results: Vec<TaskResult> = Vec::with_capacity(total);
    let mut failed: HashSet<String> = HashSet::new();

    for layer in layers {
        let mut running = Vec::with_capacity(layer.len());

        for spec in layer {
            if let Some(reason) = skip_reason(&spec, &failed) {
                failed.insert(spec.id.clone());
                results.push(TaskResult::failure(&spec.id, 1, reason));
                continue;
            }

            let executor = Arc::clone(&executor);
            let log = log.clone();
            let task_id = spec.id.clone();
            let handle = tokio::spawn(async move {
                executor.run(&spec, log, &CancellationToken::new()).await
            });
            running.push((task_id, handle));
        }

        for (task_id, handle) in running {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    TaskResult::failure(&task_id, 1, format!("panic: {}", panic_message(err)))
                }
                Err(err) => TaskResult::failure(&task_id, 1, format!("task aborted: {err}")),
            };
            if !result.is_success() {
                failed.insert(result.task_id.clone());
            }
            results.push(result);
        }
    }

    results
}

/// A skip message naming the failed dependencies, or `None` to run.
fn skip_reason(spec: &TaskSpec, failed: &HashSet<String>) -> Option<String> {
    let blocked: Vec<&str> = spec
        .dependencies
        .iter()
        .filter(|dep| failed.contains(dep.as_str()))
        .map(String::as_str)
        .collect();

    if blocked.is_empty() {
        None
    } else {
        Some(format!(
            "skipped due to failed dependencies: {}",
            blocked.join(",")
        ))
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
