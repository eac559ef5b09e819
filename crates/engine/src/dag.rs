//! DAG validation — run this before persisting a pipeline definition.
//!
//! Checks, in order:
//! 1. The DAG has at least one task.
//! 2. Task ids are unique within the DAG.
//! 3. Every dependency names a task of the same DAG.
//! 4. The dependency graph is acyclic.
//!
//! Returns the task ids in a dependency-respecting order on success.

use std::collections::HashMap;

use crate::{EngineError, models::DagDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Finished,
}

/// Validate the DAG and return its task ids ordered so that every task comes
/// after all of its dependencies.
///
/// Never mutates the input and runs in O(V+E). Cycle detection is a
/// depth-first traversal over an explicit stack of `(node, next dependency)`
/// frames, started from every unvisited task so that disconnected components
/// are covered too.
///
/// # Errors
/// - [`EngineError::EmptyDag`] if there are no tasks.
/// - [`EngineError::DuplicateTaskId`] if two tasks share an id.
/// - [`EngineError::UnknownDependency`] if a dependency names a missing task.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(dag: &DagDefinition) -> Result<Vec<String>, EngineError> {
    if dag.tasks.is_empty() {
        return Err(EngineError::EmptyDag);
    }

    // -----------------------------------------------------------------------
    // 1. Ensure task ids are unique
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(dag.tasks.len());
    for (i, task) in dag.tasks.iter().enumerate() {
        if index.insert(task.task_id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateTaskId(task.task_id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Resolve dependencies into an adjacency list of indices
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = Vec::with_capacity(dag.tasks.len());
    for task in &dag.tasks {
        let deps = task
            .dependencies
            .iter()
            .map(|dep| {
                index.get(dep.as_str()).copied().ok_or_else(|| {
                    EngineError::UnknownDependency {
                        task_id: task.task_id.clone(),
                        dependency: dep.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        adjacency.push(deps);
    }

    // -----------------------------------------------------------------------
    // 3. Three-colour DFS
    // -----------------------------------------------------------------------
    let mut marks = vec![Mark::Unvisited; dag.tasks.len()];
    let mut order: Vec<String> = Vec::with_capacity(dag.tasks.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..dag.tasks.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            if let Some(&dep) = adjacency[node].get(next) {
                frame.1 += 1;
                match marks[dep] {
                    Mark::InProgress => return Err(EngineError::CycleDetected),
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::Finished => {}
                }
            } else {
                // All dependencies finished: post-order puts them first.
                marks[node] = Mark::Finished;
                order.push(dag.tasks[node].task_id.clone());
                stack.pop();
            }
        }
    }

    Ok(order)
}
