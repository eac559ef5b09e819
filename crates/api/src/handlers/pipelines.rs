use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use engine::{CreatePipeline, Page, Pipeline, PipelineFilter, PipelineRun, UpdatePipeline, store::DEFAULT_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::{caller::RequestCaller, error::ApiResult};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub enabled_only: bool,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub(crate) fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// A pipeline plus a summary of its latest run.
#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    #[serde(flatten)]
    pub pipeline: Pipeline,
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_run_status: Option<engine::Status>,
}

impl PipelineResponse {
    fn new(pipeline: Pipeline, last_run: Option<PipelineRun>) -> Self {
        Self {
            pipeline,
            last_run_at: last_run.as_ref().map(|r| r.created_at),
            last_run_status: last_run.map(|r| r.status),
        }
    }
}

/// POST /api/v1/pipelines
pub async fn create(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {}", req.name);
    let pipeline = state.pipelines.create_pipeline(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /api/v1/pipelines
pub async fn list(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Pipeline>>> {
    let filter = PipelineFilter {
        enabled_only: query.enabled_only,
        offset: query.offset,
        limit: query.limit,
    };
    Ok(Json(state.pipelines.list_pipelines(&caller, &filter).await?))
}

/// GET /api/v1/pipelines/:id
pub async fn get(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineResponse>> {
    tracing::debug!("Getting pipeline: {}", id);
    let pipeline = state.pipelines.get_pipeline(&caller, id).await?;
    let last_run = state.pipelines.last_run(&caller, id).await?;
    Ok(Json(PipelineResponse::new(pipeline, last_run)))
}

/// PUT /api/v1/pipelines/:id
pub async fn update(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePipeline>,
) -> ApiResult<Json<Pipeline>> {
    Ok(Json(state.pipelines.update_pipeline(&caller, id, req).await?))
}

/// DELETE /api/v1/pipelines/:id
pub async fn delete(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.pipelines.delete_pipeline(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
