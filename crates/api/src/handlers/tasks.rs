use axum::{
    Json,
    extract::{Path, State},
};
use engine::{PipelineTask, Status};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::{caller::RequestCaller, error::ApiResult};

/// Status report sent by an external task executor.
#[derive(Debug, Deserialize)]
pub struct TaskStatusDto {
    pub status: Status,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
}

/// GET /api/v1/runs/:run_id/tasks
pub async fn list(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineTask>>> {
    Ok(Json(state.lifecycle.list_tasks(&caller, run_id).await?))
}

/// GET /api/v1/runs/:run_id/ready
pub async fn ready(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineTask>>> {
    Ok(Json(state.lifecycle.ready_tasks(&caller, run_id).await?))
}

/// POST /api/v1/tasks/:task_id/status
pub async fn report_status(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(task_id): Path<Uuid>,
    Json(req): Json<TaskStatusDto>,
) -> ApiResult<Json<PipelineTask>> {
    tracing::debug!("Task {} reported {}", task_id, req.status);
    let task = state
        .lifecycle
        .update_task_status(&caller, task_id, req.status, req.error_message, req.logs)
        .await?;
    Ok(Json(task))
}
