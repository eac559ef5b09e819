//! Pipeline definitions: create, update, read, list and soft delete.
//!
//! Every definition that reaches the store has passed field validation and
//! [`validate_dag`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    EngineError,
    caller::{Caller, Role},
    dag::validate_dag,
    models::{DagDefinition, Pipeline, PipelineRun},
    store::{Page, PipelineFilter, PipelineStore, RunFilter, check_page},
    trigger::validate_cron,
};

const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_SCHEDULE_LEN: usize = 100;
const MAX_TASK_ID_LEN: usize = 255;
const MAX_TASK_TYPE_LEN: usize = 100;

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub dag_definition: DagDefinition,
    /// Five-field cron expression.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePipeline {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dag_definition: Option<DagDefinition>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), EngineError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(EngineError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), EngineError> {
    description.map_or(Ok(()), |d| check_len("description", d, 0, MAX_DESCRIPTION_LEN))
}

fn validate_schedule(schedule: Option<&str>) -> Result<(), EngineError> {
    let Some(schedule) = schedule else {
        return Ok(());
    };
    check_len("schedule", schedule, 1, MAX_SCHEDULE_LEN)?;
    validate_cron(schedule)
}

/// Field limits first, then the structural checks.
fn validate_definition(dag: &DagDefinition) -> Result<(), EngineError> {
    for task in &dag.tasks {
        check_len("task_id", &task.task_id, 1, MAX_TASK_ID_LEN)?;
        check_len("task_type", &task.task_type, 1, MAX_TASK_TYPE_LEN)?;
    }
    validate_dag(dag)?;
    Ok(())
}

#[derive(Clone)]
pub struct PipelineService {
    store: Arc<dyn PipelineStore>,
}

impl PipelineService {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `Validation` or a structural DAG error for a bad definition,
    /// `Conflict` if the tenant already has a live pipeline by that name.
    pub async fn create_pipeline(
        &self,
        caller: &Caller,
        request: CreatePipeline,
    ) -> Result<Pipeline, EngineError> {
        caller.require(Role::MlEngineer)?;
        check_len("name", &request.name, 1, MAX_NAME_LEN)?;
        validate_description(request.description.as_deref())?;
        validate_schedule(request.schedule.as_deref())?;
        validate_definition(&request.dag_definition)?;

        if self
            .store
            .get_pipeline_by_name(caller.tenant_id, &request.name)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "pipeline name '{}' is taken",
                request.name
            )));
        }

        let now = Utc::now();
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            tenant_id: caller.tenant_id,
            name: request.name,
            description: request.description,
            dag_definition: request.dag_definition,
            schedule: request.schedule,
            enabled: request.enabled,
            owner_id: caller.user_id,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_pipeline(&pipeline).await?;

        info!(
            tenant_id = %pipeline.tenant_id,
            pipeline_id = %pipeline.id,
            name = %pipeline.name,
            tasks = pipeline.dag_definition.tasks.len(),
            "pipeline created"
        );
        Ok(pipeline)
    }

    pub async fn update_pipeline(
        &self,
        caller: &Caller,
        id: Uuid,
        request: UpdatePipeline,
    ) -> Result<Pipeline, EngineError> {
        caller.require(Role::MlEngineer)?;
        let mut pipeline = self.get_pipeline(caller, id).await?;

        if let Some(description) = request.description {
            validate_description(Some(&description))?;
            pipeline.description = Some(description);
        }
        if let Some(dag) = request.dag_definition {
            validate_definition(&dag)?;
            pipeline.dag_definition = dag;
        }
        if let Some(schedule) = request.schedule {
            validate_schedule(Some(&schedule))?;
            pipeline.schedule = Some(schedule);
        }
        if let Some(enabled) = request.enabled {
            pipeline.enabled = enabled;
        }
        pipeline.updated_at = Utc::now();

        self.store.update_pipeline(&pipeline).await?;
        info!(pipeline_id = %pipeline.id, "pipeline updated");
        Ok(pipeline)
    }

    pub async fn get_pipeline(&self, caller: &Caller, id: Uuid) -> Result<Pipeline, EngineError> {
        caller.require(Role::Viewer)?;
        self.store
            .get_pipeline(caller.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("pipeline", id))
    }

    pub async fn get_pipeline_by_name(&self, caller: &Caller, name: &str) -> Result<Pipeline, EngineError> {
        caller.require(Role::Viewer)?;
        self.store
            .get_pipeline_by_name(caller.tenant_id, name)
            .await?
            .ok_or_else(|| EngineError::not_found("pipeline", name))
    }

    pub async fn list_pipelines(
        &self,
        caller: &Caller,
        filter: &PipelineFilter,
    ) -> Result<Page<Pipeline>, EngineError> {
        caller.require(Role::Viewer)?;
        check_page(filter.offset, filter.limit)?;
        self.store.list_pipelines(caller.tenant_id, filter).await
    }

    /// Soft delete. Existing runs are kept.
    pub async fn delete_pipeline(&self, caller: &Caller, id: Uuid) -> Result<(), EngineError> {
        caller.require(Role::MlEngineer)?;
        let mut pipeline = self.get_pipeline(caller, id).await?;
        let now = Utc::now();
        pipeline.deleted_at = Some(now);
        pipeline.updated_at = now;

        self.store.update_pipeline(&pipeline).await?;
        info!(pipeline_id = %id, "pipeline deleted");
        Ok(())
    }

    /// Most recently created run of the pipeline, if any.
    pub async fn last_run(&self, caller: &Caller, id: Uuid) -> Result<Option<PipelineRun>, EngineError> {
        let pipeline = self.get_pipeline(caller, id).await?;
        let filter = RunFilter { pipeline_id: Some(pipeline.id), limit: 1, ..RunFilter::default() };
        let page = self.store.list_runs(caller.tenant_id, &filter).await?;
        Ok(page.items.into_iter().next())
    }
}
