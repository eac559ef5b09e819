use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{RunSnapshot, TriggerRequest};
use uuid::Uuid;

use super::AppState;
use crate::{
    caller::RequestCaller,
    error::{ApiError, ApiResult},
};

/// Decode a trigger body. Only an empty body means "manual, no parameters";
/// anything else must be a valid [`TriggerRequest`].
fn parse_request(body: &[u8]) -> ApiResult<TriggerRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TriggerRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid trigger body: {e}")))
}

/// POST /api/v1/pipelines/:id/trigger
pub async fn trigger(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(pipeline_id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RunSnapshot>)> {
    let request = parse_request(&body)?;
    let run = state.triggers.trigger(&caller, pipeline_id, request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}
