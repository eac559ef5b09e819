use axum::{
    Json,
    extract::{Path, Query, State},
};
use engine::{Page, PipelineRun, RunFilter, RunSnapshot, Status};
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, pipelines::default_limit};
use crate::{
    caller::RequestCaller,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub pipeline_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl RunQuery {
    fn into_filter(self, pipeline_id: Option<Uuid>) -> ApiResult<RunFilter> {
        let status = self
            .status
            .as_deref()
            .map(|s| s.to_ascii_uppercase().parse::<Status>())
            .transpose()
            .map_err(ApiError::BadRequest)?;
        Ok(RunFilter {
            pipeline_id: pipeline_id.or(self.pipeline_id),
            status,
            offset: self.offset,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FailRunDto {
    pub error_message: String,
}

/// GET /api/v1/runs
pub async fn list(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Query(query): Query<RunQuery>,
) -> ApiResult<Json<Page<PipelineRun>>> {
    let filter = query.into_filter(None)?;
    Ok(Json(state.lifecycle.list_runs(&caller, &filter).await?))
}

/// GET /api/v1/pipelines/:id/runs
pub async fn list_for_pipeline(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(pipeline_id): Path<Uuid>,
    Query(query): Query<RunQuery>,
) -> ApiResult<Json<Page<PipelineRun>>> {
    // 404 for unknown or foreign pipelines instead of an empty page.
    state.pipelines.get_pipeline(&caller, pipeline_id).await?;
    let filter = query.into_filter(Some(pipeline_id))?;
    Ok(Json(state.lifecycle.list_runs(&caller, &filter).await?))
}

/// GET /api/v1/runs/:run_id
pub async fn get(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunSnapshot>> {
    Ok(Json(state.lifecycle.get_run(&caller, run_id).await?))
}

/// POST /api/v1/runs/:run_id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunSnapshot>> {
    tracing::info!("Cancelling run: {}", run_id);
    Ok(Json(state.lifecycle.cancel_run(&caller, run_id).await?))
}

/// POST /api/v1/runs/:run_id/fail
pub async fn fail(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(run_id): Path<Uuid>,
    Json(req): Json<FailRunDto>,
) -> ApiResult<Json<RunSnapshot>> {
    Ok(Json(state.lifecycle.fail_run(&caller, run_id, req.error_message).await?))
}
