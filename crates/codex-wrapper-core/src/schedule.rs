//! Dependency scheduling.
//!
//! Turns a flat list of task specs into execution layers with Kahn's
//! algorithm: every task lands in a layer strictly after all of its
//! dependencies, and tasks within one layer are mutually independent and
//! safe to run concurrently.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::task::TaskSpec;

/// Compute execution layers for a batch.
///
/// Layer membership follows input order: the first layer lists every task
/// with no dependencies in the order they were declared, and so on. Returns
/// an error for dependencies on unknown ids and for cycles; cycle
/// diagnostics name the ids still blocked, sorted.
pub fn plan_layers(tasks: Vec<TaskSpec>) -> Result<Vec<Vec<TaskSpec>>, CoreError> {
    let index_of: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| (task.id.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; tasks.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];

    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            let Some(&dep_idx) = index_of.get(dep.as_str()) else {
                return Err(CoreError::UnknownDependency {
                    dependency: dep.clone(),
                    task: task.id.clone(),
                });
            };
            indegree[i] += 1;
            successors[dep_idx].push(i);
        }
    }

    let mut current: Vec<usize> = (0..tasks.len()).filter(|&i| indegree[i] == 0).collect();
    let mut layer_of: Vec<Option<usize>> = vec![None; tasks.len()];
    let mut layer_count = 0;
    let mut processed = 0;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            layer_of[i] = Some(layer_count);
            processed += 1;
            for &succ in &successors[i] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        // Input order within a layer, regardless of which dependency
        // unblocked the task first.
        next.sort_unstable();
        current = next;
        layer_count += 1;
    }

    if processed != tasks.len() {
        let mut ids: Vec<String> = tasks
            .iter()
            .enumerate()
            .filter(|(i, _)| layer_of[*i].is_none())
            .map(|(_, task)| task.id.clone())
            .collect();
        ids.sort();
        return Err(CoreError::CycleDetected { ids });
    }

    let mut layers: Vec<Vec<TaskSpec>> = (0..layer_count).map(|_| Vec::new()).collect();
    for (task, layer) in tasks.into_iter().zip(layer_of) {
        // layer is Some for every task once processed == tasks.len()
        if let Some(layer) = layer {
            layers[layer].push(task);
        }
    }

    Ok(layers)
}
