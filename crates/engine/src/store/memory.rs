//! In-process store used by tests and `orchestrator run`.
//!
//! A single async mutex guards all state, so every call is trivially atomic
//! and mutations of the same run are serialized.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Page, PipelineFilter, PipelineStore, RunFilter, RunMutation};
use crate::{
    EngineError,
    models::{Pipeline, PipelineRun, PipelineTask, RunSnapshot, Status},
};

#[derive(Default)]
struct State {
    pipelines: HashMap<Uuid, Pipeline>,
    runs: HashMap<Uuid, RunSnapshot>,
    /// task record id → run id
    task_runs: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs, across tenants.
    pub async fn run_count(&self) -> usize {
        self.state.lock().await.runs.len()
    }

    /// Number of stored task records, across tenants.
    pub async fn task_count(&self) -> usize {
        self.state.lock().await.task_runs.len()
    }
}

fn paginate<T>(mut items: Vec<T>, offset: i64, limit: i64) -> Page<T> {
    let total = items.len() as i64;
    let start = usize::try_from(offset).unwrap_or(0).min(items.len());
    let take = usize::try_from(limit).unwrap_or(0);
    let items: Vec<T> = items.drain(start..).take(take).collect();
    Page { items, total, offset, limit }
}

fn is_live(p: &Pipeline, tenant_id: Uuid) -> bool {
    p.tenant_id == tenant_id && p.deleted_at.is_none()
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let taken = state
            .pipelines
            .values()
            .any(|p| is_live(p, pipeline.tenant_id) && p.name == pipeline.name);
        if taken {
            return Err(EngineError::Conflict(format!(
                "pipeline name '{}' is taken",
                pipeline.name
            )));
        }
        state.pipelines.insert(pipeline.id, pipeline.clone());
        Ok(())
    }

    async fn get_pipeline(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Pipeline>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .pipelines
            .get(&id)
            .filter(|p| is_live(p, tenant_id))
            .cloned())
    }

    async fn get_pipeline_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Pipeline>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .pipelines
            .values()
            .find(|p| is_live(p, tenant_id) && p.name == name)
            .cloned())
    }

    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        match state.pipelines.get_mut(&pipeline.id) {
            Some(existing) if is_live(existing, pipeline.tenant_id) => {
                *existing = pipeline.clone();
                Ok(())
            }
            _ => Err(EngineError::not_found("pipeline", pipeline.id)),
        }
    }

    async fn list_pipelines(
        &self,
        tenant_id: Uuid,
        filter: &PipelineFilter,
    ) -> Result<Page<Pipeline>, EngineError> {
        let state = self.state.lock().await;
        let mut items: Vec<Pipeline> = state
            .pipelines
            .values()
            .filter(|p| is_live(p, tenant_id) && (!filter.enabled_only || p.enabled))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, filter.offset, filter.limit))
    }

    async fn insert_run(&self, snapshot: &RunSnapshot) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        for task in &snapshot.tasks {
            state.task_runs.insert(task.id, snapshot.run.id);
        }
        state.runs.insert(snapshot.run.id, snapshot.clone());
        Ok(())
    }

    async fn get_run(&self, tenant_id: Uuid, run_id: Uuid) -> Result<Option<RunSnapshot>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .get(&run_id)
            .filter(|s| s.run.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_runs(
        &self,
        tenant_id: Uuid,
        filter: &RunFilter,
    ) -> Result<Page<PipelineRun>, EngineError> {
        let state = self.state.lock().await;
        let mut items: Vec<PipelineRun> = state
            .runs
            .values()
            .map(|s| &s.run)
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| filter.pipeline_id.map_or(true, |id| r.pipeline_id == id))
            .filter(|r| filter.status.map_or(true, |st| r.status == st))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, filter.offset, filter.limit))
    }

    async fn find_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<PipelineTask>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .task_runs
            .get(&task_id)
            .and_then(|run_id| state.runs.get(run_id))
            .and_then(|s| s.task(task_id))
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_pending_runs(&self, limit: i64) -> Result<Vec<PipelineRun>, EngineError> {
        let state = self.state.lock().await;
        let mut pending: Vec<PipelineRun> = state
            .runs
            .values()
            .filter(|s| s.run.status == Status::Pending)
            .map(|s| s.run.clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn mutate_run<'a>(
        &'a self,
        tenant_id: Uuid,
        run_id: Uuid,
        apply: RunMutation<'a>,
    ) -> Result<RunSnapshot, EngineError> {
        let mut state = self.state.lock().await;
        let stored = state
            .runs
            .get_mut(&run_id)
            .filter(|s| s.run.tenant_id == tenant_id)
            .ok_or_else(|| EngineError::not_found("run", run_id))?;

        let mut working = stored.clone();
        apply(&mut working)?;
        *stored = working.clone();
        Ok(working)
    }
}
