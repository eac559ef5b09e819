//! `orchestrator` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `worker`   — drive pending runs to completion.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a DAG definition JSON file.
//! - `run`      — execute a DAG locally with the built-in executors.

mod config;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use engine::{
    Caller, CreatePipeline, DagDefinition, InMemoryStore, PgStore, PipelineService, PipelineStore,
    RunExecutor, RunLifecycle, Status, TriggerIntake, TriggerRequest,
};
use executors::ExecutorRegistry;

use config::{DatabaseArgs, ExecutionArgs, WorkerArgs};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    about = "DAG pipeline orchestration engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "ORCHESTRATOR_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Start a background worker that drives pending runs.
    Worker {
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        worker: WorkerArgs,
        #[command(flatten)]
        execution: ExecutionArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a DAG definition JSON file.
    Validate {
        /// Path to the DAG JSON file.
        path: PathBuf,
    },
    /// Execute a DAG definition locally against an in-memory store.
    Run {
        /// Path to the DAG JSON file.
        path: PathBuf,
        /// Run parameter as `key=value`; the value is parsed as JSON when
        /// possible. Repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        #[command(flatten)]
        execution: ExecutionArgs,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err("parameter name must not be empty".into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn read_dag(path: &Path) -> anyhow::Result<DagDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid DAG JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, database } => {
            info!("Starting API server on {bind}");
            let store: Arc<dyn PipelineStore> = Arc::new(PgStore::new(database.connect().await?));
            api::serve(&bind, store).await?;
        }
        Command::Worker { database, worker, execution } => {
            info!("Starting background worker");
            let store: Arc<dyn PipelineStore> = Arc::new(PgStore::new(database.connect().await?));
            let executor = RunExecutor::new(
                RunLifecycle::new(Arc::clone(&store)),
                ExecutorRegistry::with_builtins(),
                execution.executor_config(),
            );
            worker::run(store, Arc::new(executor), &worker).await?;
        }
        Command::Migrate { database } => {
            let pool = database.connect().await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let dag = read_dag(&path)?;
            match engine::validate_dag(&dag) {
                Ok(order) => {
                    println!("✅ DAG is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path, params, execution } => {
            let status = run_locally(&path, params, &execution).await?;
            if status != Status::Success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_locally(
    path: &Path,
    params: Vec<(String, Value)>,
    execution: &ExecutionArgs,
) -> anyhow::Result<Status> {
    let dag = read_dag(path)?;
    let store: Arc<dyn PipelineStore> = Arc::new(InMemoryStore::new());
    let lifecycle = RunLifecycle::new(Arc::clone(&store));
    let caller = Caller::system(Uuid::new_v4());

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("local")
        .to_owned();
    let pipeline = PipelineService::new(store)
        .create_pipeline(
            &caller,
            CreatePipeline {
                name,
                description: None,
                dag_definition: dag,
                schedule: None,
                enabled: true,
            },
        )
        .await?;

    let parameters: Map<String, Value> = params.into_iter().collect();
    let run = TriggerIntake::new(lifecycle.clone())
        .trigger(&caller, pipeline.id, TriggerRequest::manual(parameters))
        .await?;

    let executor = RunExecutor::new(lifecycle, ExecutorRegistry::with_builtins(), execution.executor_config());
    let done = executor.drive(&caller, run.run.id).await?;
    if !done.run.status.is_terminal() {
        bail!("run {} stopped in {}", done.run.id, done.run.status);
    }

    for task in &done.tasks {
        match &task.error_message {
            Some(err) => println!("{:<10} {}  ({err})", task.status.to_string(), task.task_id),
            None => println!("{:<10} {}", task.status.to_string(), task.task_id),
        }
    }
    match done.run.duration() {
        Some(d) => println!("run {} {} in {} ms", done.run.id, done.run.status, d.num_milliseconds()),
        None => println!("run {} {}", done.run.id, done.run.status),
    }
    Ok(done.run.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_as_json_when_possible() {
        assert_eq!(parse_param("epochs=10").unwrap(), ("epochs".into(), Value::from(10)));
        assert_eq!(
            parse_param("dataset=2024-q1").unwrap(),
            ("dataset".into(), Value::String("2024-q1".into()))
        );
        assert_eq!(parse_param("flag=true").unwrap().1, Value::Bool(true));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn run_subcommand_collects_repeated_params() {
        let cli = Cli::try_parse_from([
            "orchestrator",
            "run",
            "dag.json",
            "--param",
            "a=1",
            "--param",
            "b=x",
        ])
        .unwrap();
        match cli.command {
            Command::Run { params, .. } => assert_eq!(params.len(), 2),
            _ => panic!("expected run"),
        }
    }
}
