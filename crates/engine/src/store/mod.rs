//! Persistence seam between the engine and the pipeline definition store.
//!
//! The engine only ever talks to [`PipelineStore`]. Two implementations ship
//! with the crate: [`memory::InMemoryStore`] for tests and local runs, and
//! [`postgres::PgStore`] on top of the `db` crate.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    EngineError,
    models::{Pipeline, PipelineRun, PipelineTask, RunSnapshot, Status},
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// A read-modify-write step applied to a run and its tasks under the run's
/// lock. Returning an error discards every change the closure made.
pub type RunMutation<'a> =
    Box<dyn FnOnce(&mut RunSnapshot) -> Result<(), EngineError> + Send + 'a>;

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 1000;

#[derive(Debug, Clone)]
pub struct PipelineFilter {
    pub enabled_only: bool,
    pub offset: i64,
    pub limit: i64,
}

impl Default for PipelineFilter {
    fn default() -> Self {
        Self { enabled_only: false, offset: 0, limit: DEFAULT_PAGE_LIMIT }
    }
}

#[derive(Debug, Clone)]
pub struct RunFilter {
    pub pipeline_id: Option<Uuid>,
    pub status: Option<Status>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self { pipeline_id: None, status: None, offset: 0, limit: DEFAULT_PAGE_LIMIT }
    }
}

/// Reject out-of-range pagination before it reaches the store.
pub fn check_page(offset: i64, limit: i64) -> Result<(), EngineError> {
    if offset < 0 {
        return Err(EngineError::Validation("offset must be >= 0".into()));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(EngineError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(())
}

/// One page of a listing plus the total number of matching records.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Durable holder of pipelines, runs and task records.
///
/// Every tenant-scoped method filters on `tenant_id`; records belonging to
/// another tenant behave as if they did not exist.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert a pipeline. Fails with `Conflict` if the tenant already has a
    /// live pipeline with the same name.
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError>;

    /// Fetch a live (not soft-deleted) pipeline.
    async fn get_pipeline(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Pipeline>, EngineError>;

    async fn get_pipeline_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Pipeline>, EngineError>;

    /// Overwrite a live pipeline's mutable fields, including `deleted_at`.
    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError>;

    /// Live pipelines, newest first.
    async fn list_pipelines(
        &self,
        tenant_id: Uuid,
        filter: &PipelineFilter,
    ) -> Result<Page<Pipeline>, EngineError>;

    /// Insert a run together with all of its task records, atomically.
    async fn insert_run(&self, snapshot: &RunSnapshot) -> Result<(), EngineError>;

    async fn get_run(&self, tenant_id: Uuid, run_id: Uuid) -> Result<Option<RunSnapshot>, EngineError>;

    /// Runs, newest first.
    async fn list_runs(
        &self,
        tenant_id: Uuid,
        filter: &RunFilter,
    ) -> Result<Page<PipelineRun>, EngineError>;

    /// Look up a task record by its primary key.
    async fn find_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<PipelineTask>, EngineError>;

    /// Oldest `PENDING` runs across all tenants, for background workers.
    async fn list_pending_runs(&self, limit: i64) -> Result<Vec<PipelineRun>, EngineError>;

    /// Atomically read a run, apply `apply` to it and write back whatever
    /// changed. Calls for the same run are serialized.
    ///
    /// Fails with `NotFound` if the run does not exist for the tenant, or
    /// with whatever error `apply` returns (in which case nothing is written).
    async fn mutate_run<'a>(
        &'a self,
        tenant_id: Uuid,
        run_id: Uuid,
        apply: RunMutation<'a>,
    ) -> Result<RunSnapshot, EngineError>;
}
