//! Core domain models for the orchestration engine.
//!
//! These types are the source of truth for what a pipeline, a run and a task
//! record look like in memory.  The DAG types serialise to/from the JSONB
//! `dag_definition` column of the `pipelines` table.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status shared by runs and task records.
///
/// `PENDING → RUNNING → {SUCCESS | FAILED | CANCELLED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl Status {
    /// No further transition is permitted out of a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING"   => Ok(Self::Pending),
            "RUNNING"   => Ok(Self::Running),
            "SUCCESS"   => Ok(Self::Success),
            "FAILED"    => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other       => Err(format!("unknown status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerType
// ---------------------------------------------------------------------------

/// What initiated a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Requested by a user.
    #[default]
    Manual,
    /// An external scheduler tick matched the pipeline's cron schedule.
    Scheduled,
    /// An external drift evaluation exceeded its threshold.
    Drift,
    /// An external watcher saw enough new data arrive.
    DataArrival,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Drift => write!(f, "drift"),
            Self::DataArrival => write!(f, "data_arrival"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual"       => Ok(Self::Manual),
            "scheduled"    => Ok(Self::Scheduled),
            "drift"        => Ok(Self::Drift),
            "data_arrival" => Ok(Self::DataArrival),
            other          => Err(format!("unknown trigger type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// DAG definition
// ---------------------------------------------------------------------------

/// A single task in a pipeline's DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique identifier within this DAG (referenced by `dependencies`).
    pub task_id: String,
    /// Maps to a registered `TaskExecutor` implementation.
    pub task_type: String,
    /// Opaque configuration passed to the executor.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Tasks that must reach `SUCCESS` before this one may start.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskDefinition {
    /// Convenience constructor for tests and demos.
    pub fn new(task_id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            config: Map::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Ordered task list plus arguments applied to every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DagDefinition {
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub default_args: Map<String, Value>,
}

impl DagDefinition {
    pub fn new(tasks: Vec<TaskDefinition>) -> Self {
        Self { tasks, default_args: Map::new() }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// `default_args` overlaid with the task's own config; task keys win.
    pub fn effective_config(&self, task: &TaskDefinition) -> Map<String, Value> {
        let mut config = self.default_args.clone();
        for (key, value) in &task.config {
            config.insert(key.clone(), value.clone());
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A tenant-owned DAG definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub dag_definition: DagDefinition,
    /// Cron expression evaluated by an external scheduler.
    pub schedule: Option<String>,
    pub enabled: bool,
    pub owner_id: Option<Uuid>,
    /// Set on soft deletion; deleted pipelines are invisible to every read.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Runs and task records
// ---------------------------------------------------------------------------

/// One execution attempt of a pipeline's DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub tenant_id: Uuid,
    pub status: Status,
    pub trigger_type: TriggerType,
    pub parameters: Map<String, Value>,
    /// The pipeline's DAG as it was when the run was created. Read-only.
    pub dag: DagDefinition,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub triggered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

/// One task's execution record within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub id: Uuid,
    pub pipeline_run_id: Uuid,
    pub tenant_id: Uuid,
    /// Matches a `TaskDefinition::task_id` of the run's DAG.
    pub task_id: String,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub logs: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A run together with all of its task records, in DAG order.
///
/// This is the unit the store reads, locks and writes atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(flatten)]
    pub run: PipelineRun,
    pub tasks: Vec<PipelineTask>,
}

impl RunSnapshot {
    /// Current status of every task, keyed by DAG task id.
    pub fn statuses(&self) -> HashMap<String, Status> {
        self.tasks
            .iter()
            .map(|t| (t.task_id.clone(), t.status))
            .collect()
    }

    /// Look up a task record by its primary key.
    pub fn task(&self, id: Uuid) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut PipelineTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Look up a task record by its DAG task id.
    pub fn task_named(&self, task_id: &str) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}
