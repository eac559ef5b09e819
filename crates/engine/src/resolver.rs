//! Dependency resolution over a DAG and the current task statuses.
//!
//! Everything here is a pure function of its arguments: no state is kept
//! between calls, so the resolver is safe to call from any thread.
//!
//! A task missing from the status map is treated as `PENDING`.

use std::collections::{BTreeSet, HashMap};

use crate::models::{DagDefinition, Status};

/// How a run ended, as decided by [`is_terminal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    /// Every task succeeded.
    Succeeded,
    /// Nothing can make progress and not every task succeeded.
    Failed {
        /// Tasks that reported `FAILED`.
        failed: Vec<String>,
        /// Tasks that were cancelled or are blocked behind a failure.
        cancelled: Vec<String>,
    },
}

impl TerminalState {
    /// The run status this outcome maps onto.
    pub fn run_status(&self) -> Status {
        match self {
            Self::Succeeded => Status::Success,
            Self::Failed { .. } => Status::Failed,
        }
    }

    /// Human readable reason recorded on a failed run.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Succeeded => None,
            Self::Failed { failed, .. } if !failed.is_empty() => {
                Some(format!("task(s) failed: {}", failed.join(", ")))
            }
            Self::Failed { cancelled, .. } => {
                Some(format!("task(s) cancelled: {}", cancelled.join(", ")))
            }
        }
    }
}

fn status_of(statuses: &HashMap<String, Status>, task_id: &str) -> Status {
    statuses.get(task_id).copied().unwrap_or(Status::Pending)
}

/// Tasks that may be dispatched now: `PENDING` with every dependency in
/// `SUCCESS`.
///
/// Independent tasks are returned together so callers can dispatch them in
/// parallel; the set carries no ordering guarantee beyond its sort.
pub fn ready_tasks(dag: &DagDefinition, statuses: &HashMap<String, Status>) -> BTreeSet<String> {
    dag.tasks
        .iter()
        .filter(|task| status_of(statuses, &task.task_id) == Status::Pending)
        .filter(|task| {
            task.dependencies
                .iter()
                .all(|dep| status_of(statuses, dep) == Status::Success)
        })
        .map(|task| task.task_id.clone())
        .collect()
}

/// Whether `task_id` may be dispatched now.
pub fn is_ready(dag: &DagDefinition, statuses: &HashMap<String, Status>, task_id: &str) -> bool {
    dag.task(task_id).is_some_and(|task| {
        status_of(statuses, task_id) == Status::Pending
            && task
                .dependencies
                .iter()
                .all(|dep| status_of(statuses, dep) == Status::Success)
    })
}

/// `PENDING` tasks that can never become ready because some ancestor is
/// `FAILED` or `CANCELLED`, directly or transitively.
///
/// Callers mark these `CANCELLED` without dispatching them.
pub fn blocked_tasks(dag: &DagDefinition, statuses: &HashMap<String, Status>) -> BTreeSet<String> {
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in &dag.tasks {
        for dep in &task.dependencies {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(task.task_id.as_str());
        }
    }

    let mut work: Vec<&str> = dag
        .tasks
        .iter()
        .map(|t| t.task_id.as_str())
        .filter(|id| matches!(status_of(statuses, id), Status::Failed | Status::Cancelled))
        .collect();

    let mut blocked: BTreeSet<String> = BTreeSet::new();
    while let Some(id) = work.pop() {
        for &dependent in dependents.get(id).into_iter().flatten() {
            if status_of(statuses, dependent) == Status::Pending
                && blocked.insert(dependent.to_owned())
            {
                work.push(dependent);
            }
        }
    }

    blocked
}

/// Decide whether a run has reached a terminal state.
///
/// - `Some(Succeeded)` when every task is `SUCCESS`.
/// - `Some(Failed { .. })` when nothing is `RUNNING`, nothing is ready, and
///   every remaining `PENDING` task is blocked.
/// - `None` while progress is still possible.
pub fn is_terminal(dag: &DagDefinition, statuses: &HashMap<String, Status>) -> Option<TerminalState> {
    let status = |id: &str| status_of(statuses, id);

    if dag.tasks.iter().all(|t| status(&t.task_id) == Status::Success) {
        return Some(TerminalState::Succeeded);
    }

    if dag.tasks.iter().any(|t| status(&t.task_id) == Status::Running) {
        return None;
    }

    if !ready_tasks(dag, statuses).is_empty() {
        return None;
    }

    let blocked = blocked_tasks(dag, statuses);
    let mut failed = Vec::new();
    let mut cancelled = Vec::new();
    for task in &dag.tasks {
        match status(&task.task_id) {
            Status::Failed => failed.push(task.task_id.clone()),
            Status::Cancelled => cancelled.push(task.task_id.clone()),
            Status::Pending if blocked.contains(&task.task_id) => {
                cancelled.push(task.task_id.clone())
            }
            Status::Pending => return None,
            Status::Success | Status::Running => {}
        }
    }

    Some(TerminalState::Failed { failed, cancelled })
}
