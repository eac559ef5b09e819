//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// pipelines
// ---------------------------------------------------------------------------

/// A persisted pipeline definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Full JSON DAG definition (tasks, default_args)
    pub dag_definition: serde_json::Value,
    pub schedule: Option<String>,
    pub enabled: bool,
    pub owner_id: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// pipeline_runs
// ---------------------------------------------------------------------------

/// A persisted pipeline run row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRunRow {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub trigger_type: String,
    pub parameters: serde_json::Value,
    /// DAG captured when the run was created; never updated afterwards.
    pub dag_snapshot: serde_json::Value,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub triggered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// pipeline_tasks
// ---------------------------------------------------------------------------

/// A persisted task record within a run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineTaskRow {
    pub id: Uuid,
    pub pipeline_run_id: Uuid,
    pub tenant_id: Uuid,
    pub task_id: String,
    /// Index of the task in the run's DAG snapshot.
    pub position: i32,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub logs: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
