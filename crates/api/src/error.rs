//! API error handling.
//!
//! Every handler returns [`ApiResult`]; engine errors are mapped onto HTTP
//! status codes here and rendered as `{"error": {"code", "message"}}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use engine::EngineError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself was malformed (headers, query, body).
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP status and stable machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        let err = match self {
            Self::BadRequest(_) => return (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Engine(err) => err,
        };

        match err {
            EngineError::EmptyDag => (StatusCode::BAD_REQUEST, "empty_dag"),
            EngineError::DuplicateTaskId(_) => (StatusCode::BAD_REQUEST, "duplicate_task_id"),
            EngineError::UnknownDependency { .. } => (StatusCode::BAD_REQUEST, "unknown_dependency"),
            EngineError::CycleDetected => (StatusCode::BAD_REQUEST, "cycle_detected"),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            EngineError::PipelineDisabled => (StatusCode::BAD_REQUEST, "pipeline_disabled"),
            EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            EngineError::DependenciesNotMet { .. } => (StatusCode::CONFLICT, "dependencies_not_met"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            EngineError::Database(_)
            | EngineError::CorruptRecord(_)
            | EngineError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {:?}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}
