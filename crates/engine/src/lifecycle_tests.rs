//! Engine-level scenarios: trigger intake, the run lifecycle and the run
//! executor working together against the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use executors::mock::MockExecutor;
use executors::{ExecutorRegistry, TaskContext, TaskError, TaskExecutor, TaskOutput};

use crate::{
    Caller, CreatePipeline, DagDefinition, DataArrivalTriggerConfig, DriftTriggerConfig, EngineError, ExecutorConfig,
    InMemoryStore, Pipeline, PipelineService, PipelineStore, Role, RunExecutor, RunLifecycle,
    RunSnapshot, Status, TaskDefinition, TriggerIntake, TriggerRequest, TriggerType, UpdatePipeline,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<InMemoryStore>,
    pipelines: PipelineService,
    lifecycle: RunLifecycle,
    triggers: TriggerIntake,
    caller: Caller,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let shared: Arc<dyn PipelineStore> = store.clone();
    let lifecycle = RunLifecycle::new(Arc::clone(&shared));
    Harness {
        store,
        pipelines: PipelineService::new(shared),
        triggers: TriggerIntake::new(lifecycle.clone()),
        lifecycle,
        caller: Caller::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::MlEngineer),
    }
}

fn task(id: &str, deps: &[&str]) -> TaskDefinition {
    TaskDefinition::new(id, "mock").depends_on(deps.iter().copied())
}

impl Harness {
    async fn pipeline(&self, tasks: Vec<TaskDefinition>) -> Pipeline {
        self.pipelines
            .create_pipeline(
                &self.caller,
                CreatePipeline {
                    name: format!("pipeline-{}", Uuid::new_v4()),
                    description: None,
                    dag_definition: DagDefinition::new(tasks),
                    schedule: None,
                    enabled: true,
                },
            )
            .await
            .expect("valid pipeline")
    }

    async fn start(&self, pipeline: &Pipeline) -> RunSnapshot {
        self.triggers
            .trigger(&self.caller, pipeline.id, TriggerRequest::default())
            .await
            .expect("trigger")
    }

    async fn report(&self, snapshot: &RunSnapshot, task_id: &str, status: Status) -> Result<(), EngineError> {
        let id = record(snapshot, task_id);
        self.lifecycle
            .update_task_status(&self.caller, id, status, None, None)
            .await
            .map(|_| ())
    }

    async fn run(&self, run_id: Uuid) -> RunSnapshot {
        self.lifecycle.get_run(&self.caller, run_id).await.unwrap()
    }

    async fn ready(&self, run_id: Uuid) -> Vec<String> {
        self.lifecycle
            .ready_tasks(&self.caller, run_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect()
    }
}

fn record(snapshot: &RunSnapshot, task_id: &str) -> Uuid {
    snapshot.task_named(task_id).expect("task in run").id
}

fn status_of(snapshot: &RunSnapshot, task_id: &str) -> Status {
    snapshot.task_named(task_id).expect("task in run").status
}

// ============================================================
// Run lifecycle
// ============================================================

#[tokio::test]
async fn two_step_run_progresses_to_success() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"])]).await;
    let run = h.start(&p).await;

    assert_eq!(run.run.status, Status::Pending);
    assert_eq!(run.tasks.len(), 2);
    assert!(run.tasks.iter().all(|t| t.status == Status::Pending));
    assert_eq!(h.ready(run.run.id).await, vec!["a"]);

    h.report(&run, "a", Status::Running).await.unwrap();
    let current = h.run(run.run.id).await;
    assert_eq!(current.run.status, Status::Running);
    assert!(current.run.start_time.is_some());
    assert!(h.ready(run.run.id).await.is_empty());

    h.report(&run, "a", Status::Success).await.unwrap();
    assert_eq!(h.ready(run.run.id).await, vec!["b"]);

    h.report(&run, "b", Status::Running).await.unwrap();
    h.report(&run, "b", Status::Success).await.unwrap();

    let done = h.run(run.run.id).await;
    assert_eq!(done.run.status, Status::Success);
    assert!(done.run.end_time.is_some());
    assert!(done.run.error_message.is_none());
    assert!(h.ready(run.run.id).await.is_empty());
}

#[tokio::test]
async fn downstream_task_cannot_be_dispatched_early() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"])]).await;
    let run = h.start(&p).await;

    let err = h.report(&run, "b", Status::Running).await.unwrap_err();
    assert!(matches!(err, EngineError::DependenciesNotMet { task_id } if task_id == "b"));

    let after = h.run(run.run.id).await;
    assert_eq!(after.run.status, Status::Pending);
    assert_eq!(status_of(&after, "b"), Status::Pending);
}

#[tokio::test]
async fn failure_cancels_downstream_and_fails_the_run() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])]).await;
    let run = h.start(&p).await;

    h.report(&run, "a", Status::Running).await.unwrap();
    h.lifecycle
        .update_task_status(&h.caller, record(&run, "a"), Status::Failed, Some("boom".into()), None)
        .await
        .unwrap();

    let after = h.run(run.run.id).await;
    assert_eq!(after.run.status, Status::Failed);
    assert_eq!(after.run.error_message.as_deref(), Some("task(s) failed: a"));
    assert_eq!(status_of(&after, "b"), Status::Cancelled);
    assert_eq!(status_of(&after, "c"), Status::Cancelled);
    let b = after.task_named("b").unwrap();
    assert!(b.start_time.is_none(), "b was never dispatched");
    assert!(b.error_message.as_deref().unwrap().ends_with(": a"));
    assert!(after.task_named("c").unwrap().error_message.as_deref().unwrap().ends_with(": b"));
    assert_eq!(after.task_named("a").unwrap().error_message.as_deref(), Some("boom"));

    assert!(matches!(
        h.report(&run, "b", Status::Running).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn independent_branch_keeps_running_after_a_failure() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"]), task("x", &[])]).await;
    let run = h.start(&p).await;

    h.report(&run, "a", Status::Failed).await.unwrap();
    let after = h.run(run.run.id).await;
    assert_eq!(after.run.status, Status::Running);
    assert_eq!(status_of(&after, "b"), Status::Cancelled);
    assert_eq!(h.ready(run.run.id).await, vec!["x"]);

    h.report(&run, "x", Status::Success).await.unwrap();
    assert_eq!(h.run(run.run.id).await.run.status, Status::Failed);
}

#[tokio::test]
async fn disabled_pipeline_creates_no_records() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    h.pipelines
        .update_pipeline(&h.caller, p.id, UpdatePipeline { enabled: Some(false), ..Default::default() })
        .await
        .unwrap();

    let err = h
        .triggers
        .trigger(&h.caller, p.id, TriggerRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PipelineDisabled));
    assert_eq!(err.to_string(), "Pipeline is disabled");
    assert_eq!(h.store.run_count().await, 0);
    assert_eq!(h.store.task_count().await, 0);
}

#[tokio::test]
async fn triggering_an_unknown_pipeline_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.triggers.trigger(&h.caller, Uuid::new_v4(), TriggerRequest::default()).await,
        Err(EngineError::NotFound { entity: "pipeline", .. })
    ));
}

#[tokio::test]
async fn cancelling_a_running_run_cancels_every_open_task() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &[]), task("c", &["a"])]).await;
    let run = h.start(&p).await;
    h.report(&run, "a", Status::Running).await.unwrap();
    h.report(&run, "b", Status::Running).await.unwrap();
    h.report(&run, "b", Status::Success).await.unwrap();

    let cancelled = h.lifecycle.cancel_run(&h.caller, run.run.id).await.unwrap();
    assert_eq!(cancelled.run.status, Status::Cancelled);
    assert!(cancelled.run.end_time.is_some());
    assert_eq!(status_of(&cancelled, "a"), Status::Cancelled);
    assert_eq!(status_of(&cancelled, "b"), Status::Success);
    assert_eq!(status_of(&cancelled, "c"), Status::Cancelled);

    // The executor of `a` finishing late is rejected, not applied.
    assert!(matches!(
        h.report(&run, "a", Status::Success).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert_eq!(h.run(run.run.id).await.run.status, Status::Cancelled);
}

#[tokio::test]
async fn cancelling_a_finished_run_is_an_invalid_transition() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let run = h.start(&p).await;
    h.report(&run, "a", Status::Success).await.unwrap();
    assert_eq!(h.run(run.run.id).await.run.status, Status::Success);

    let err = h.lifecycle.cancel_run(&h.caller, run.run.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition { entity: "run", from: Status::Success, to: Status::Cancelled }
    ));
    assert_eq!(h.run(run.run.id).await.run.status, Status::Success);
}

#[tokio::test]
async fn pending_run_can_be_cancelled() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let run = h.start(&p).await;

    let cancelled = h.lifecycle.cancel_run(&h.caller, run.run.id).await.unwrap();
    assert_eq!(cancelled.run.status, Status::Cancelled);
    assert!(cancelled.run.start_time.is_none());
}

#[tokio::test]
async fn fail_run_records_message_and_closes_tasks() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"])]).await;
    let run = h.start(&p).await;
    h.report(&run, "a", Status::Running).await.unwrap();

    let failed = h
        .lifecycle
        .fail_run(&h.caller, run.run.id, "wall-clock limit exceeded")
        .await
        .unwrap();
    assert_eq!(failed.run.status, Status::Failed);
    assert_eq!(failed.run.error_message.as_deref(), Some("wall-clock limit exceeded"));
    assert!(failed.tasks.iter().all(|t| t.status == Status::Cancelled));

    assert!(h.lifecycle.fail_run(&h.caller, run.run.id, "again").await.is_err());
}

#[tokio::test]
async fn double_dispatch_is_rejected() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let run = h.start(&p).await;
    h.report(&run, "a", Status::Running).await.unwrap();

    assert!(matches!(
        h.report(&run, "a", Status::Running).await,
        Err(EngineError::InvalidTransition { entity: "task", .. })
    ));
}

#[tokio::test]
async fn run_keeps_its_dag_snapshot_when_the_pipeline_changes() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &["a"])]).await;
    let run = h.start(&p).await;

    h.pipelines
        .update_pipeline(
            &h.caller,
            p.id,
            UpdatePipeline {
                dag_definition: Some(DagDefinition::new(vec![task("z", &[])])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let current = h.run(run.run.id).await;
    assert_eq!(current.run.dag, p.dag_definition);
    assert_eq!(h.ready(run.run.id).await, vec!["a"]);

    let last = h.pipelines.last_run(&h.caller, p.id).await.unwrap().unwrap();
    assert_eq!(last.id, run.run.id);
}

#[tokio::test]
async fn other_tenants_and_low_roles_are_kept_out() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let run = h.start(&p).await;

    let stranger = Caller::new(Uuid::new_v4(), None, Role::Admin);
    assert!(matches!(
        h.lifecycle.get_run(&stranger, run.run.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        h.lifecycle
            .update_task_status(&stranger, record(&run, "a"), Status::Running, None, None)
            .await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        h.triggers.trigger(&stranger, p.id, TriggerRequest::default()).await,
        Err(EngineError::NotFound { .. })
    ));

    let viewer = Caller::new(h.caller.tenant_id, None, Role::Viewer);
    assert!(h.lifecycle.get_run(&viewer, run.run.id).await.is_ok());
    assert!(matches!(
        h.lifecycle.cancel_run(&viewer, run.run.id).await,
        Err(EngineError::Forbidden { required: Role::MlEngineer })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_final_reports_finish_the_run_exactly_once() {
    let h = Arc::new(harness());
    let p = h.pipeline(vec![task("a", &[]), task("b", &[])]).await;

    for _ in 0..50 {
        let run = h.start(&p).await;
        h.report(&run, "a", Status::Running).await.unwrap();
        h.report(&run, "b", Status::Running).await.unwrap();

        let reports = ["a", "b"].map(|id| {
            let h = Arc::clone(&h);
            let run = run.clone();
            tokio::spawn(async move { h.report(&run, id, Status::Success).await })
        });
        for report in reports {
            report.await.unwrap().expect("neither report is lost");
        }

        let done = h.run(run.run.id).await;
        assert_eq!(done.run.status, Status::Success);
        assert!(done.tasks.iter().all(|t| t.status == Status::Success));
        assert!(matches!(
            h.lifecycle.cancel_run(&h.caller, run.run.id).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }
}

// ============================================================
// Trigger intake
// ============================================================

#[tokio::test]
async fn drift_trigger_fires_only_above_threshold() {
    let h = harness();
    let p = h.pipeline(vec![task("retrain", &[])]).await;
    let config = DriftTriggerConfig::new(Uuid::new_v4());

    let quiet = h
        .triggers
        .on_drift(&h.caller, p.id, &config, 0.1, Map::new())
        .await
        .unwrap();
    assert!(quiet.is_none());
    assert_eq!(h.store.run_count().await, 0);

    let fired = h
        .triggers
        .on_drift(&h.caller, p.id, &config, 0.42, Map::new())
        .await
        .unwrap()
        .expect("threshold breached");
    assert_eq!(fired.run.trigger_type, TriggerType::Drift);
    assert_eq!(fired.run.parameters["drift_score"], json!(0.42));
}

#[tokio::test]
async fn data_arrival_trigger_waits_for_enough_records() {
    let h = harness();
    let p = h.pipeline(vec![task("ingest", &[])]).await;
    let config = DataArrivalTriggerConfig::new("s3://landing/events");

    let early = h
        .triggers
        .on_data_arrival(&h.caller, p.id, &config, 999, Map::new())
        .await
        .unwrap();
    assert!(early.is_none());
    assert_eq!(h.store.run_count().await, 0);

    let mut params = Map::new();
    params.insert("batch".into(), json!("2024-06-01"));
    let fired = h
        .triggers
        .on_data_arrival(&h.caller, p.id, &config, 1000, params)
        .await
        .unwrap()
        .expect("minimum reached");
    assert_eq!(fired.run.trigger_type, TriggerType::DataArrival);
    assert_eq!(fired.run.parameters["record_count"], json!(1000));
    assert_eq!(fired.run.parameters["source_path"], json!("s3://landing/events"));
    assert_eq!(fired.run.parameters["batch"], json!("2024-06-01"));
    assert_eq!(h.store.run_count().await, 1);
}

#[tokio::test]
async fn manual_trigger_records_parameters_and_caller() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let mut params = Map::new();
    params.insert("epochs".into(), json!(10));

    let run = h
        .triggers
        .trigger(&h.caller, p.id, TriggerRequest::manual(params))
        .await
        .unwrap();
    assert_eq!(run.run.parameters["epochs"], json!(10));
    assert_eq!(run.run.triggered_by, h.caller.user_id);
    assert_eq!(run.run.trigger_type, TriggerType::Manual);
}

// ============================================================
// Run executor
// ============================================================

fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        max_parallelism: None,
    }
}

fn executor(h: &Harness, registry: ExecutorRegistry, config: ExecutorConfig) -> RunExecutor {
    RunExecutor::new(h.lifecycle.clone(), registry, config)
}

#[tokio::test]
async fn executor_runs_a_diamond_with_parallel_branches() {
    let h = harness();
    let p = h
        .pipeline(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ])
        .await;
    let run = h.start(&p).await;

    let mock = Arc::new(MockExecutor::succeeding("mock").with_delay(Duration::from_millis(50)));
    let mut registry = ExecutorRegistry::new();
    registry.register("mock", mock.clone());

    let done = executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();

    assert_eq!(done.run.status, Status::Success);
    assert_eq!(mock.call_count(), 4);
    let calls = mock.called_tasks();
    assert_eq!(calls.first().map(String::as_str), Some("a"));
    assert_eq!(calls.last().map(String::as_str), Some("d"));

    let b = done.task_named("b").unwrap();
    let c = done.task_named("c").unwrap();
    assert!(b.start_time.unwrap() < c.end_time.unwrap());
    assert!(c.start_time.unwrap() < b.end_time.unwrap());
    assert_eq!(done.task_named("d").unwrap().logs.as_deref(), Some("mock ok"));
}

#[tokio::test]
async fn executor_retries_flaky_tasks() {
    let h = harness();
    let p = h.pipeline(vec![TaskDefinition::new("fetch", "flaky")]).await;
    let run = h.start(&p).await;

    let flaky = Arc::new(MockExecutor::flaky("flaky", 2));
    let mut registry = ExecutorRegistry::new();
    registry.register("flaky", flaky.clone());

    let done = executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Success);
    assert_eq!(flaky.call_count(), 3);
}

#[tokio::test]
async fn executor_gives_up_after_max_retries() {
    let h = harness();
    let p = h.pipeline(vec![TaskDefinition::new("fetch", "down")]).await;
    let run = h.start(&p).await;

    let down = Arc::new(MockExecutor::failing_retryable("down", "connection refused"));
    let mut registry = ExecutorRegistry::new();
    registry.register("down", down.clone());
    let config = ExecutorConfig { max_retries: 2, ..fast_config() };

    let done = executor(&h, registry, config)
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Failed);
    assert_eq!(down.call_count(), 3);
    let message = done.task_named("fetch").unwrap().error_message.clone().unwrap();
    assert!(message.contains("retries exhausted"));
    assert!(message.contains("connection refused"));
}

#[tokio::test]
async fn large_retry_budget_still_finishes_the_run() {
    let h = harness();
    let p = h.pipeline(vec![TaskDefinition::new("fetch", "down")]).await;
    let run = h.start(&p).await;

    let down = Arc::new(MockExecutor::failing_retryable("down", "timeout"));
    let mut registry = ExecutorRegistry::new();
    registry.register("down", down.clone());
    let config = ExecutorConfig {
        max_retries: 40,
        retry_base_delay: Duration::ZERO,
        max_parallelism: None,
    };

    let done = executor(&h, registry, config)
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Failed);
    assert_eq!(status_of(&done, "fetch"), Status::Failed);
    assert_eq!(down.call_count(), 41);
    let message = done.task_named("fetch").unwrap().error_message.clone().unwrap();
    assert!(message.starts_with("retries exhausted after 41 attempts"));
}

struct Panicking;

#[async_trait]
impl TaskExecutor for Panicking {
    async fn execute(&self, _ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        panic!("executor bug");
    }
}

#[tokio::test]
async fn panicking_executor_fails_its_task_and_the_run() {
    let h = harness();
    let p = h
        .pipeline(vec![
            TaskDefinition::new("score", "panics"),
            task("publish", &["score"]),
        ])
        .await;
    let run = h.start(&p).await;

    let mock = Arc::new(MockExecutor::succeeding("mock"));
    let mut registry = ExecutorRegistry::new();
    registry.register("panics", Arc::new(Panicking));
    registry.register("mock", mock.clone());

    let done = executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Failed);
    assert_eq!(status_of(&done, "score"), Status::Failed);
    assert_eq!(status_of(&done, "publish"), Status::Cancelled);
    assert_eq!(mock.call_count(), 0);
    let message = done.task_named("score").unwrap().error_message.clone().unwrap();
    assert!(message.contains("panicked"));
}

#[tokio::test]
async fn fatal_task_skips_its_dependents() {
    let h = harness();
    let p = h
        .pipeline(vec![
            TaskDefinition::new("extract", "broken"),
            task("train", &["extract"]),
        ])
        .await;
    let run = h.start(&p).await;

    let broken = Arc::new(MockExecutor::failing_fatal("broken", "schema mismatch"));
    let mock = Arc::new(MockExecutor::succeeding("mock"));
    let mut registry = ExecutorRegistry::new();
    registry.register("broken", broken.clone());
    registry.register("mock", mock.clone());

    let done = executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Failed);
    assert_eq!(broken.call_count(), 1);
    assert_eq!(mock.call_count(), 0);
    assert_eq!(status_of(&done, "extract"), Status::Failed);
    assert_eq!(status_of(&done, "train"), Status::Cancelled);
}

#[tokio::test]
async fn unregistered_task_type_fails_the_task() {
    let h = harness();
    let p = h.pipeline(vec![TaskDefinition::new("train", "gpu-training")]).await;
    let run = h.start(&p).await;

    let done = executor(&h, ExecutorRegistry::new(), fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Failed);
    let train = done.task_named("train").unwrap();
    assert_eq!(train.status, Status::Failed);
    assert!(train.error_message.as_deref().unwrap().contains("gpu-training"));
}

#[tokio::test]
async fn parallelism_cap_serializes_independent_tasks() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[]), task("b", &[]), task("c", &[])]).await;
    let run = h.start(&p).await;

    let mut registry = ExecutorRegistry::new();
    registry.register(
        "mock",
        Arc::new(MockExecutor::succeeding("mock").with_delay(Duration::from_millis(10))),
    );
    let config = ExecutorConfig { max_parallelism: Some(1), ..fast_config() };

    let done = executor(&h, registry, config)
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Success);

    let mut spans: Vec<_> = done
        .tasks
        .iter()
        .map(|t| (t.start_time.unwrap(), t.end_time.unwrap()))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "tasks overlapped");
    }
}

/// Records the context of every call.
#[derive(Default)]
struct Capture(Mutex<Vec<TaskContext>>);

#[async_trait]
impl TaskExecutor for Capture {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        self.0.lock().unwrap().push(ctx.clone());
        Ok(TaskOutput::default())
    }
}

#[tokio::test]
async fn executor_receives_merged_config_and_run_parameters() {
    let h = harness();
    let mut dag = DagDefinition::new(vec![
        TaskDefinition::new("train", "capture").with_config("epochs", json!(20)),
    ]);
    dag.default_args.insert("epochs".into(), json!(1));
    dag.default_args.insert("owner".into(), json!("ml-team"));
    let p = h
        .pipelines
        .create_pipeline(
            &h.caller,
            CreatePipeline {
                name: "capture".into(),
                description: None,
                dag_definition: dag,
                schedule: None,
                enabled: true,
            },
        )
        .await
        .unwrap();

    let mut params = Map::new();
    params.insert("dataset".into(), Value::String("2024-q1".into()));
    let run = h
        .triggers
        .trigger(&h.caller, p.id, TriggerRequest::manual(params))
        .await
        .unwrap();

    let capture = Arc::new(Capture::default());
    let mut registry = ExecutorRegistry::new();
    registry.register("capture", capture.clone());
    executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();

    let seen = capture.0.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let ctx = &seen[0];
    assert_eq!(ctx.task_id, "train");
    assert_eq!(ctx.run_id, run.run.id);
    assert_eq!(ctx.config["epochs"], json!(20));
    assert_eq!(ctx.config["owner"], json!("ml-team"));
    assert_eq!(ctx.parameters["dataset"], json!("2024-q1"));
}

#[tokio::test]
async fn driving_a_cancelled_run_dispatches_nothing() {
    let h = harness();
    let p = h.pipeline(vec![task("a", &[])]).await;
    let run = h.start(&p).await;
    h.lifecycle.cancel_run(&h.caller, run.run.id).await.unwrap();

    let mock = Arc::new(MockExecutor::succeeding("mock"));
    let mut registry = ExecutorRegistry::new();
    registry.register("mock", mock.clone());

    let done = executor(&h, registry, fast_config())
        .drive(&h.caller, run.run.id)
        .await
        .unwrap();
    assert_eq!(done.run.status, Status::Cancelled);
    assert_eq!(mock.call_count(), 0);
}
