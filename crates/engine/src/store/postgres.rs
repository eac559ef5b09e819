//! [`PipelineStore`] on Postgres, via the `db` crate's repository functions.
//!
//! Run creation and run mutation each happen inside a single transaction.
//! `mutate_run` takes a `FOR UPDATE` lock on the run row first, so status
//! reports for the same run are serialized even across processes.

use async_trait::async_trait;
use db::models::{PipelineRow, PipelineRunRow, PipelineTaskRow};
use db::repository::{pipelines, runs, tasks};
use db::{DbError, DbPool};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Page, PipelineFilter, PipelineStore, RunFilter, RunMutation};
use crate::{
    EngineError,
    models::{Pipeline, PipelineRun, PipelineTask, RunSnapshot},
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row ↔ domain conversions
// ---------------------------------------------------------------------------

fn parse<T: std::str::FromStr<Err = String>>(value: &str, what: &str, id: Uuid) -> Result<T, EngineError> {
    value
        .parse()
        .map_err(|e| EngineError::CorruptRecord(format!("{what} {id}: {e}")))
}

fn object(value: Value, what: &str, id: Uuid) -> Result<Map<String, Value>, EngineError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(EngineError::CorruptRecord(format!(
            "{what} {id}: expected a JSON object, found {other}"
        ))),
    }
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = EngineError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            dag_definition: serde_json::from_value(row.dag_definition)?,
            schedule: row.schedule,
            enabled: row.enabled,
            owner_id: row.owner_id,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn pipeline_row(p: &Pipeline) -> Result<PipelineRow, EngineError> {
    Ok(PipelineRow {
        id: p.id,
        tenant_id: p.tenant_id,
        name: p.name.clone(),
        description: p.description.clone(),
        dag_definition: serde_json::to_value(&p.dag_definition)?,
        schedule: p.schedule.clone(),
        enabled: p.enabled,
        owner_id: p.owner_id,
        deleted_at: p.deleted_at,
        created_at: p.created_at,
        updated_at: p.updated_at,
    })
}

impl TryFrom<PipelineRunRow> for PipelineRun {
    type Error = EngineError;

    fn try_from(row: PipelineRunRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse(&row.status, "run", row.id)?,
            trigger_type: parse(&row.trigger_type, "run", row.id)?,
            parameters: object(row.parameters, "run parameters", row.id)?,
            dag: serde_json::from_value(row.dag_snapshot)?,
            id: row.id,
            pipeline_id: row.pipeline_id,
            tenant_id: row.tenant_id,
            start_time: row.start_time,
            end_time: row.end_time,
            error_message: row.error_message,
            triggered_by: row.triggered_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn run_row(run: &PipelineRun) -> Result<PipelineRunRow, EngineError> {
    Ok(PipelineRunRow {
        id: run.id,
        pipeline_id: run.pipeline_id,
        tenant_id: run.tenant_id,
        status: run.status.to_string(),
        trigger_type: run.trigger_type.to_string(),
        parameters: Value::Object(run.parameters.clone()),
        dag_snapshot: serde_json::to_value(&run.dag)?,
        start_time: run.start_time,
        end_time: run.end_time,
        error_message: run.error_message.clone(),
        triggered_by: run.triggered_by,
        created_at: run.created_at,
        updated_at: run.updated_at,
    })
}

impl TryFrom<PipelineTaskRow> for PipelineTask {
    type Error = EngineError;

    fn try_from(row: PipelineTaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse(&row.status, "task", row.id)?,
            id: row.id,
            pipeline_run_id: row.pipeline_run_id,
            tenant_id: row.tenant_id,
            task_id: row.task_id,
            start_time: row.start_time,
            end_time: row.end_time,
            error_message: row.error_message,
            logs: row.logs,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn task_row(task: &PipelineTask, position: usize) -> PipelineTaskRow {
    PipelineTaskRow {
        id: task.id,
        pipeline_run_id: task.pipeline_run_id,
        tenant_id: task.tenant_id,
        task_id: task.task_id.clone(),
        position: i32::try_from(position).unwrap_or(i32::MAX),
        status: task.status.to_string(),
        start_time: task.start_time,
        end_time: task.end_time,
        error_message: task.error_message.clone(),
        logs: task.logs.clone(),
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

fn snapshot(run: PipelineRunRow, task_rows: Vec<PipelineTaskRow>) -> Result<RunSnapshot, EngineError> {
    Ok(RunSnapshot {
        run: run.try_into()?,
        tasks: task_rows
            .into_iter()
            .map(PipelineTask::try_from)
            .collect::<Result<_, _>>()?,
    })
}

// ---------------------------------------------------------------------------
// PipelineStore
// ---------------------------------------------------------------------------

#[async_trait]
impl PipelineStore for PgStore {
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError> {
        match pipelines::insert_pipeline(&self.pool, &pipeline_row(pipeline)?).await {
            Err(DbError::Conflict(msg)) => Err(EngineError::Conflict(msg)),
            other => Ok(other?),
        }
    }

    async fn get_pipeline(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Pipeline>, EngineError> {
        pipelines::get_pipeline(&self.pool, tenant_id, id)
            .await?
            .map(Pipeline::try_from)
            .transpose()
    }

    async fn get_pipeline_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Pipeline>, EngineError> {
        pipelines::get_pipeline_by_name(&self.pool, tenant_id, name)
            .await?
            .map(Pipeline::try_from)
            .transpose()
    }

    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError> {
        match pipelines::update_pipeline(&self.pool, &pipeline_row(pipeline)?).await {
            Err(DbError::NotFound) => Err(EngineError::not_found("pipeline", pipeline.id)),
            other => Ok(other?),
        }
    }

    async fn list_pipelines(
        &self,
        tenant_id: Uuid,
        filter: &PipelineFilter,
    ) -> Result<Page<Pipeline>, EngineError> {
        let (rows, total) = pipelines::list_pipelines(
            &self.pool,
            tenant_id,
            filter.enabled_only,
            filter.offset,
            filter.limit,
        )
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Pipeline::try_from).collect::<Result<_, _>>()?,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn insert_run(&self, snapshot: &RunSnapshot) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        runs::insert_run(&mut *tx, &run_row(&snapshot.run)?).await?;
        for (position, task) in snapshot.tasks.iter().enumerate() {
            tasks::insert_task(&mut *tx, &task_row(task, position)).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn get_run(&self, tenant_id: Uuid, run_id: Uuid) -> Result<Option<RunSnapshot>, EngineError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let Some(run) = runs::get_run(&mut *tx, tenant_id, run_id).await? else {
            return Ok(None);
        };
        let task_rows = tasks::list_tasks_for_run(&mut *tx, tenant_id, run_id).await?;

        tx.commit().await.map_err(DbError::from)?;
        snapshot(run, task_rows).map(Some)
    }

    async fn list_runs(
        &self,
        tenant_id: Uuid,
        filter: &RunFilter,
    ) -> Result<Page<PipelineRun>, EngineError> {
        let status = filter.status.map(|s| s.to_string());
        let (rows, total) = runs::list_runs(
            &self.pool,
            tenant_id,
            filter.pipeline_id,
            status.as_deref(),
            filter.offset,
            filter.limit,
        )
        .await?;

        Ok(Page {
            items: rows.into_iter().map(PipelineRun::try_from).collect::<Result<_, _>>()?,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn find_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<PipelineTask>, EngineError> {
        tasks::get_task(&self.pool, tenant_id, task_id)
            .await?
            .map(PipelineTask::try_from)
            .transpose()
    }

    async fn list_pending_runs(&self, limit: i64) -> Result<Vec<PipelineRun>, EngineError> {
        runs::list_pending_runs(&self.pool, limit)
            .await?
            .into_iter()
            .map(PipelineRun::try_from)
            .collect()
    }

    async fn mutate_run<'a>(
        &'a self,
        tenant_id: Uuid,
        run_id: Uuid,
        apply: RunMutation<'a>,
    ) -> Result<RunSnapshot, EngineError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let run = runs::lock_run(&mut *tx, tenant_id, run_id)
            .await?
            .ok_or_else(|| EngineError::not_found("run", run_id))?;
        let task_rows = tasks::list_tasks_for_run(&mut *tx, tenant_id, run_id).await?;
        let before = snapshot(run, task_rows)?;

        // Dropping `tx` on error rolls back and releases the lock.
        let mut after = before.clone();
        apply(&mut after)?;

        if after.run != before.run {
            runs::update_run(&mut *tx, &run_row(&after.run)?).await?;
        }
        for (position, (old, new)) in before.tasks.iter().zip(&after.tasks).enumerate() {
            if old != new {
                tasks::update_task(&mut *tx, &task_row(new, position)).await?;
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(after)
    }
}
