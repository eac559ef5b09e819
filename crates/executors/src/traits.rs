//! The `TaskExecutor` trait — the contract every task type must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::TaskError;

/// Everything an executor learns about the task it is asked to run.
///
/// Defined here (in the executors crate) so both the engine and individual
/// executor implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub tenant_id: Uuid,
    pub pipeline_id: Uuid,
    pub run_id: Uuid,
    /// Id of the `pipeline_tasks` record being executed.
    pub task_record_id: Uuid,
    /// The task's id within its DAG.
    pub task_id: String,
    pub task_type: String,
    /// The DAG's default arguments overlaid with the task's own config.
    pub config: Map<String, Value>,
    /// Runtime parameters supplied when the run was triggered.
    pub parameters: Map<String, Value>,
}

impl TaskContext {
    /// Look up a string config value.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// What a successful execution hands back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Captured log text, stored on the task record.
    pub logs: Option<String>,
}

impl TaskOutput {
    pub fn with_logs(logs: impl Into<String>) -> Self {
        Self { logs: Some(logs.into()) }
    }
}

/// The core executor trait.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task described by `ctx` to completion.
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;
}
