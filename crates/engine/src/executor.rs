//! Run execution driver.
//!
//! `RunExecutor` is a reference worker that pushes one run to completion:
//! 1. Reads the run and asks the resolver for the ready set.
//! 2. Reports each ready task `RUNNING` and spawns its executor, so
//!    independent tasks run in parallel (optionally capped).
//! 3. Retries `TaskError::Retryable` with exponential back-off and records
//!    `TaskError::Fatal` (or exhausted retries) as `FAILED`.
//! 4. Reports every result through [`RunLifecycle`], which cancels blocked
//!    tasks and settles the run.
//! 5. Stops dispatching once the run is terminal. Reports rejected by the
//!    state machine after a cancellation are logged and dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use executors::{ExecutorRegistry, TaskContext, TaskError, TaskExecutor, TaskOutput};

use crate::{
    EngineError,
    caller::Caller,
    lifecycle::RunLifecycle,
    models::{PipelineTask, RunSnapshot, Status},
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable task failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound on tasks of one run executing at once. `None` means
    /// every ready task is dispatched immediately.
    pub max_parallelism: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            max_parallelism: None,
        }
    }
}

/// Upper bound on a single back-off sleep.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

type Finished = (PipelineTask, Result<TaskOutput, TaskError>);

// ---------------------------------------------------------------------------
// RunExecutor
// ---------------------------------------------------------------------------

pub struct RunExecutor {
    lifecycle: RunLifecycle,
    registry: ExecutorRegistry,
    config: ExecutorConfig,
}

impl RunExecutor {
    pub fn new(lifecycle: RunLifecycle, registry: ExecutorRegistry, config: ExecutorConfig) -> Self {
        Self { lifecycle, registry, config }
    }

    /// Drive the run until it is terminal and return its final state.
    ///
    /// Returns early with a non-terminal snapshot if the remaining work is
    /// held by another worker.
    ///
    /// # Errors
    /// `NotFound` for an unknown run, or any store failure. Task failures
    /// are recorded on the run, not returned.
    #[instrument(skip(self, caller), fields(tenant_id = %caller.tenant_id))]
    pub async fn drive(&self, caller: &Caller, run_id: Uuid) -> Result<RunSnapshot, EngineError> {
        let semaphore = self
            .config
            .max_parallelism
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut in_flight: JoinSet<Finished> = JoinSet::new();
        let mut attempted: HashSet<Uuid> = HashSet::new();

        loop {
            let snapshot = self.lifecycle.get_run(caller, run_id).await?;

            if !snapshot.run.status.is_terminal() {
                let ready = self.lifecycle.ready_tasks(caller, run_id).await?;
                debug!(ready = ready.len(), in_flight = in_flight.len(), "dispatch round");

                for task in ready {
                    if attempted.contains(&task.id) {
                        continue;
                    }
                    let permit = match &semaphore {
                        Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                        None => None,
                    };
                    attempted.insert(task.id);

                    let Some(ctx) = self.dispatch(caller, &snapshot, &task).await? else {
                        continue;
                    };
                    let Some(executor) = self.registry.get(&ctx.task_type) else {
                        let message = format!("no executor registered for task_type '{}'", ctx.task_type);
                        self.report(caller, &task, Err(TaskError::Fatal(message))).await?;
                        continue;
                    };

                    let config = self.config.clone();
                    in_flight.spawn(async move {
                        // Nested so a panic in the retry loop still comes
                        // back tied to its task.
                        let result = match tokio::spawn(execute_with_retry(config, executor, ctx)).await {
                            Ok(result) => result,
                            Err(join_err) => Err(TaskError::Fatal(format!("task driver aborted: {join_err}"))),
                        };
                        drop(permit);
                        (task, result)
                    });
                }
            }

            match in_flight.join_next().await {
                Some(Ok((task, result))) => self.report(caller, &task, result).await?,
                Some(Err(join_err)) => error!("task driver aborted: {join_err}"),
                None => {
                    let snapshot = self.lifecycle.get_run(caller, run_id).await?;
                    let newly_ready = self
                        .lifecycle
                        .ready_tasks(caller, run_id)
                        .await?
                        .iter()
                        .any(|t| !attempted.contains(&t.id));
                    if snapshot.run.status.is_terminal() || !newly_ready {
                        info!(run_id = %run_id, status = %snapshot.run.status, "run driver finished");
                        return Ok(snapshot);
                    }
                }
            }
        }
    }

    /// Mark the task `RUNNING` and build its context. `None` means another
    /// worker got there first or the run was cancelled meanwhile.
    async fn dispatch(
        &self,
        caller: &Caller,
        snapshot: &RunSnapshot,
        task: &PipelineTask,
    ) -> Result<Option<TaskContext>, EngineError> {
        let Some(definition) = snapshot.run.dag.task(&task.task_id) else {
            return Err(EngineError::CorruptRecord(format!(
                "task '{}' of run {} is missing from its DAG",
                task.task_id, snapshot.run.id
            )));
        };

        if self.registry.contains(&definition.task_type) {
            match self
                .lifecycle
                .update_task_status(caller, task.id, Status::Running, None, None)
                .await
            {
                Ok(_) => {}
                Err(err @ (EngineError::InvalidTransition { .. } | EngineError::DependenciesNotMet { .. })) => {
                    warn!(task_id = %task.task_id, "skipping dispatch: {err}");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Some(TaskContext {
            tenant_id: snapshot.run.tenant_id,
            pipeline_id: snapshot.run.pipeline_id,
            run_id: snapshot.run.id,
            task_record_id: task.id,
            task_id: task.task_id.clone(),
            task_type: definition.task_type.clone(),
            config: snapshot.run.dag.effective_config(definition),
            parameters: snapshot.run.parameters.clone(),
        }))
    }

    async fn report(
        &self,
        caller: &Caller,
        task: &PipelineTask,
        result: Result<TaskOutput, TaskError>,
    ) -> Result<(), EngineError> {
        let (status, error_message, logs) = match result {
            Ok(output) => {
                info!(task_id = %task.task_id, "task succeeded");
                (Status::Success, None, output.logs)
            }
            Err(err) => {
                error!(task_id = %task.task_id, "task failed: {err}");
                (Status::Failed, Some(err.message().to_owned()), None)
            }
        };

        match self
            .lifecycle
            .update_task_status(caller, task.id, status, error_message, logs)
            .await
        {
            Ok(_) => Ok(()),
            Err(err @ EngineError::InvalidTransition { .. }) => {
                warn!(task_id = %task.task_id, "late report ignored: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: execute a single task with retry logic.
// ---------------------------------------------------------------------------

async fn execute_with_retry(
    config: ExecutorConfig,
    executor: Arc<dyn TaskExecutor>,
    ctx: TaskContext,
) -> Result<TaskOutput, TaskError> {
    let ctx = Arc::new(ctx);
    let mut attempts = 0u32;

    loop {
        match execute_isolated(Arc::clone(&executor), Arc::clone(&ctx)).await {
            Ok(output) => return Ok(output),

            Err(TaskError::Fatal(msg)) => return Err(TaskError::Fatal(msg)),

            Err(TaskError::Retryable(msg)) => {
                attempts = attempts.saturating_add(1);
                if attempts > config.max_retries {
                    return Err(TaskError::Fatal(format!(
                        "retries exhausted after {} attempts: {msg}",
                        attempts
                    )));
                }

                let delay = retry_delay(config.retry_base_delay, attempts);

                warn!(
                    "task '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                    ctx.task_id, attempts, config.max_retries, delay, msg
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Back-off before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Run one attempt on its own task so a panicking executor fails the task
/// instead of the driver.
async fn execute_isolated(
    executor: Arc<dyn TaskExecutor>,
    ctx: Arc<TaskContext>,
) -> Result<TaskOutput, TaskError> {
    match tokio::spawn(async move { executor.execute(&ctx).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(TaskError::Fatal(format!("executor panicked: {join_err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_from_the_base() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(100));
        assert_eq!(retry_delay(base, 2), Duration::from_millis(200));
        assert_eq!(retry_delay(base, 4), Duration::from_millis(800));
    }

    #[test]
    fn retry_delay_is_capped_for_large_attempt_numbers() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(base, 33), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::from_secs(u64::MAX), 2), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::ZERO, 40), Duration::ZERO);
    }
}
