//! Run lifecycle manager.
//!
//! Owns run creation and every status change of a run or task record.
//! Each change is a single [`PipelineStore::mutate_run`] call: the task
//! transition, the cancellation of tasks blocked behind a failure and the
//! run-level terminal transition all land together or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    EngineError,
    caller::{Caller, Role},
    models::{Pipeline, PipelineRun, PipelineTask, RunSnapshot, Status, TaskDefinition, TriggerType},
    resolver,
    store::{Page, PipelineStore, RunFilter, check_page},
};

#[derive(Clone)]
pub struct RunLifecycle {
    store: Arc<dyn PipelineStore>,
}

impl RunLifecycle {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PipelineStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a `PENDING` run with one `PENDING` task record per task of the
    /// pipeline's current DAG. The DAG is copied into the run.
    ///
    /// # Errors
    /// `NotFound` if the pipeline belongs to another tenant or was deleted,
    /// `PipelineDisabled` if it is disabled. Nothing is written on error.
    pub async fn create_run(
        &self,
        caller: &Caller,
        pipeline: &Pipeline,
        trigger_type: TriggerType,
        parameters: Map<String, Value>,
    ) -> Result<RunSnapshot, EngineError> {
        caller.require(Role::MlEngineer)?;
        if pipeline.tenant_id != caller.tenant_id || pipeline.deleted_at.is_some() {
            return Err(EngineError::not_found("pipeline", pipeline.id));
        }
        if !pipeline.enabled {
            return Err(EngineError::PipelineDisabled);
        }

        let now = Utc::now();
        let run = PipelineRun {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            tenant_id: pipeline.tenant_id,
            status: Status::Pending,
            trigger_type,
            parameters,
            dag: pipeline.dag_definition.clone(),
            start_time: None,
            end_time: None,
            error_message: None,
            triggered_by: caller.user_id,
            created_at: now,
            updated_at: now,
        };
        let tasks = run
            .dag
            .tasks
            .iter()
            .map(|def| PipelineTask {
                id: Uuid::new_v4(),
                pipeline_run_id: run.id,
                tenant_id: run.tenant_id,
                task_id: def.task_id.clone(),
                status: Status::Pending,
                start_time: None,
                end_time: None,
                error_message: None,
                logs: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let snapshot = RunSnapshot { run, tasks };

        self.store.insert_run(&snapshot).await?;
        info!(
            tenant_id = %snapshot.run.tenant_id,
            pipeline_id = %snapshot.run.pipeline_id,
            run_id = %snapshot.run.id,
            trigger_type = %snapshot.run.trigger_type,
            tasks = snapshot.tasks.len(),
            "run created"
        );
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A run with its task records nested.
    pub async fn get_run(&self, caller: &Caller, run_id: Uuid) -> Result<RunSnapshot, EngineError> {
        caller.require(Role::Viewer)?;
        self.store
            .get_run(caller.tenant_id, run_id)
            .await?
            .ok_or_else(|| EngineError::not_found("run", run_id))
    }

    pub async fn list_runs(
        &self,
        caller: &Caller,
        filter: &RunFilter,
    ) -> Result<Page<PipelineRun>, EngineError> {
        caller.require(Role::Viewer)?;
        check_page(filter.offset, filter.limit)?;
        self.store.list_runs(caller.tenant_id, filter).await
    }

    /// Task records of a run, in DAG order.
    pub async fn list_tasks(&self, caller: &Caller, run_id: Uuid) -> Result<Vec<PipelineTask>, EngineError> {
        Ok(self.get_run(caller, run_id).await?.tasks)
    }

    /// Task records the resolver currently allows to be dispatched.
    ///
    /// Empty once the run is terminal.
    pub async fn ready_tasks(&self, caller: &Caller, run_id: Uuid) -> Result<Vec<PipelineTask>, EngineError> {
        let snapshot = self.get_run(caller, run_id).await?;
        if snapshot.run.status.is_terminal() {
            return Ok(Vec::new());
        }

        let ready = resolver::ready_tasks(&snapshot.run.dag, &snapshot.statuses());
        debug!(run_id = %run_id, ready = ?ready, "resolved ready set");
        Ok(snapshot
            .tasks
            .into_iter()
            .filter(|t| ready.contains(&t.task_id))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Record a status reported for one task record and settle the run.
    ///
    /// # Errors
    /// - `NotFound` for an unknown task record.
    /// - `InvalidTransition` if the task state machine forbids the change.
    /// - `DependenciesNotMet` when dispatching a task whose dependencies have
    ///   not all succeeded.
    pub async fn update_task_status(
        &self,
        caller: &Caller,
        task_id: Uuid,
        status: Status,
        error_message: Option<String>,
        logs: Option<String>,
    ) -> Result<PipelineTask, EngineError> {
        caller.require(Role::MlEngineer)?;
        let task = self
            .store
            .find_task(caller.tenant_id, task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))?;

        let snapshot = self
            .store
            .mutate_run(
                caller.tenant_id,
                task.pipeline_run_id,
                Box::new(move |snapshot: &mut RunSnapshot| {
                    apply_task_status(snapshot, task_id, status, error_message, logs, Utc::now())
                }),
            )
            .await?;

        info!(
            run_id = %task.pipeline_run_id,
            task_id = %task.task_id,
            to = %status,
            run_status = %snapshot.run.status,
            "task status updated"
        );
        snapshot
            .task(task_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("task", task_id))
    }

    /// Cancel a `PENDING` or `RUNNING` run and every non-terminal task.
    ///
    /// Running tasks are not interrupted; their late reports are rejected.
    pub async fn cancel_run(&self, caller: &Caller, run_id: Uuid) -> Result<RunSnapshot, EngineError> {
        caller.require(Role::MlEngineer)?;
        let snapshot = self
            .store
            .mutate_run(
                caller.tenant_id,
                run_id,
                Box::new(|snapshot: &mut RunSnapshot| {
                    let now = Utc::now();
                    snapshot.run.transition(Status::Cancelled, None, now)?;
                    close_outstanding(snapshot, "run cancelled", now)
                }),
            )
            .await?;

        info!(run_id = %run_id, "run cancelled");
        Ok(snapshot)
    }

    /// Fail a run from outside, e.g. when a wrapping scheduler enforces a
    /// wall-clock limit. Outstanding tasks are cancelled.
    pub async fn fail_run(
        &self,
        caller: &Caller,
        run_id: Uuid,
        message: impl Into<String>,
    ) -> Result<RunSnapshot, EngineError> {
        caller.require(Role::MlEngineer)?;
        let message = message.into();
        let snapshot = self
            .store
            .mutate_run(
                caller.tenant_id,
                run_id,
                Box::new(move |snapshot: &mut RunSnapshot| {
                    let now = Utc::now();
                    let reason = format!("run failed: {message}");
                    snapshot.run.transition(Status::Failed, Some(message), now)?;
                    close_outstanding(snapshot, &reason, now)
                }),
            )
            .await?;

        warn!(run_id = %run_id, error = ?snapshot.run.error_message, "run failed externally");
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Mutations applied under the run lock
// ---------------------------------------------------------------------------

fn apply_task_status(
    snapshot: &mut RunSnapshot,
    id: Uuid,
    to: Status,
    error_message: Option<String>,
    logs: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let statuses = snapshot.statuses();
    let current = snapshot
        .task(id)
        .ok_or_else(|| EngineError::not_found("task", id))?;

    // Dispatch gate: leaving PENDING other than by cancellation needs every
    // dependency in SUCCESS.
    if current.status == Status::Pending
        && to != Status::Cancelled
        && !resolver::is_ready(&snapshot.run.dag, &statuses, &current.task_id)
    {
        return Err(EngineError::DependenciesNotMet { task_id: current.task_id.clone() });
    }

    let task = snapshot
        .task_mut(id)
        .ok_or_else(|| EngineError::not_found("task", id))?;
    task.transition(to, now)?;
    if error_message.is_some() {
        task.error_message = error_message;
    }
    if logs.is_some() {
        task.logs = logs;
    }

    if to != Status::Cancelled {
        snapshot.run.mark_running(now)?;
    }
    settle(snapshot, now)
}

/// Cancel tasks blocked behind a failure, then apply the run's terminal
/// transition if the resolver says it has finished.
fn settle(snapshot: &mut RunSnapshot, now: DateTime<Utc>) -> Result<(), EngineError> {
    let statuses = snapshot.statuses();
    let blocked = resolver::blocked_tasks(&snapshot.run.dag, &statuses);

    if !blocked.is_empty() {
        let definitions: HashMap<&str, &TaskDefinition> = snapshot
            .run
            .dag
            .tasks
            .iter()
            .map(|def| (def.task_id.as_str(), def))
            .collect();

        let mut reasons: HashMap<&str, String> = blocked
            .iter()
            .map(|task_id| {
                let upstream: Vec<&str> = definitions
                    .get(task_id.as_str())
                    .map(|def| {
                        def.dependencies
                            .iter()
                            .map(String::as_str)
                            .filter(|dep| {
                                blocked.contains(*dep)
                                    || matches!(statuses.get(*dep), Some(Status::Failed | Status::Cancelled))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (task_id.as_str(), format!("upstream task(s) did not succeed: {}", upstream.join(", ")))
            })
            .collect();

        for task in snapshot.tasks.iter_mut() {
            if let Some(reason) = reasons.remove(task.task_id.as_str()) {
                task.transition(Status::Cancelled, now)?;
                task.error_message = Some(reason);
            }
        }
    }

    if snapshot.run.status.is_terminal() {
        // Already decided by an earlier writer.
        return Ok(());
    }

    if let Some(outcome) = resolver::is_terminal(&snapshot.run.dag, &snapshot.statuses()) {
        snapshot
            .run
            .transition(outcome.run_status(), outcome.error_message(), now)?;
        info!(
            run_id = %snapshot.run.id,
            status = %snapshot.run.status,
            "run finished"
        );
    }
    Ok(())
}

fn close_outstanding(snapshot: &mut RunSnapshot, reason: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
    for task in snapshot.tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
        task.transition(Status::Cancelled, now)?;
        task.error_message = Some(reason.to_owned());
    }
    Ok(())
}
