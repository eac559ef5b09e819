//! Route handlers, grouped by resource.

pub mod pipelines;
pub mod runs;
pub mod tasks;
pub mod triggers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use engine::{PipelineService, PipelineStore, RunLifecycle, TriggerIntake};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipelines: PipelineService,
    pub lifecycle: RunLifecycle,
    pub triggers: TriggerIntake,
}

impl AppState {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        let lifecycle = RunLifecycle::new(Arc::clone(&store));
        Self {
            pipelines: PipelineService::new(store),
            triggers: TriggerIntake::new(lifecycle.clone()),
            lifecycle,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // Pipelines
        .route("/api/v1/pipelines", post(pipelines::create).get(pipelines::list))
        .route(
            "/api/v1/pipelines/:id",
            get(pipelines::get).put(pipelines::update).delete(pipelines::delete),
        )
        .route("/api/v1/pipelines/:id/trigger", post(triggers::trigger))
        .route("/api/v1/pipelines/:id/runs", get(runs::list_for_pipeline))
        // Runs
        .route("/api/v1/runs", get(runs::list))
        .route("/api/v1/runs/:run_id", get(runs::get))
        .route("/api/v1/runs/:run_id/cancel", post(runs::cancel))
        .route("/api/v1/runs/:run_id/fail", post(runs::fail))
        .route("/api/v1/runs/:run_id/tasks", get(tasks::list))
        .route("/api/v1/runs/:run_id/ready", get(tasks::ready))
        // Task status reports from executors
        .route("/api/v1/tasks/:task_id/status", post(tasks::report_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
