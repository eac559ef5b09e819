//! Engine-level error types.

use thiserror::Error;

use crate::caller::Role;
use crate::models::Status;

/// Errors produced by the orchestration engine.
///
/// Task-level failures are never surfaced through this type: they are
/// recorded on the task record as `FAILED` and propagated through the
/// dependency resolver.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Structural DAG errors ------

    /// The DAG has no tasks.
    #[error("DAG must have at least one task")]
    EmptyDag,

    /// Two or more tasks share the same id.
    #[error("duplicate task_id: '{0}'")]
    DuplicateTaskId(String),

    /// A task depends on a task id that is not part of the DAG.
    #[error("task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        task_id: String,
        dependency: String,
    },

    /// Depth-first traversal found a back edge.
    #[error("DAG contains a cycle")]
    CycleDetected,

    // ------ Request validation ------

    #[error("validation error: {0}")]
    Validation(String),

    /// Runs cannot be created for a disabled pipeline.
    #[error("Pipeline is disabled")]
    PipelineDisabled,

    // ------ State machine violations ------

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: Status,
        to: Status,
    },

    /// A task was dispatched before all of its dependencies succeeded.
    #[error("task '{task_id}' has dependencies that have not succeeded")]
    DependenciesNotMet { task_id: String },

    // ------ Lookup / access ------

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("requires {required} role or higher")]
    Forbidden { required: Role },

    // ------ Infrastructure ------

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// A stored row could not be mapped back onto the domain model.
    #[error("corrupt stored record: {0}")]
    CorruptRecord(String),

    /// A stored JSON document did not match the domain model.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}
