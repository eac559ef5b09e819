//! `api` crate — HTTP REST API over the orchestration engine.
//!
//! Exposes:
//!   POST   /api/v1/pipelines
//!   GET    /api/v1/pipelines
//!   GET    /api/v1/pipelines/:id
//!   PUT    /api/v1/pipelines/:id
//!   DELETE /api/v1/pipelines/:id
//!   POST   /api/v1/pipelines/:id/trigger
//!   GET    /api/v1/pipelines/:id/runs
//!   GET    /api/v1/runs
//!   GET    /api/v1/runs/:run_id
//!   POST   /api/v1/runs/:run_id/cancel
//!   POST   /api/v1/runs/:run_id/fail
//!   GET    /api/v1/runs/:run_id/tasks
//!   GET    /api/v1/runs/:run_id/ready
//!   POST   /api/v1/tasks/:task_id/status

pub mod caller;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use engine::PipelineStore;
use tracing::info;

pub use handlers::{AppState, router};

/// Bind `addr` and serve the API until the process is stopped.
pub async fn serve(addr: &str, store: Arc<dyn PipelineStore>) -> std::io::Result<()> {
    let app = router(AppState::new(store));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
