//! `engine` crate — domain models, DAG validation, dependency resolution,
//! the run lifecycle state machine, trigger intake and the run executor.

pub mod models;
pub mod caller;
pub mod error;
pub mod dag;
pub mod resolver;
pub mod state;
pub mod store;
pub mod lifecycle;
pub mod trigger;
pub mod pipelines;
pub mod executor;

pub use models::{DagDefinition, Pipeline, PipelineRun, PipelineTask, RunSnapshot, Status, TaskDefinition, TriggerType};
pub use caller::{Caller, Role};
pub use error::EngineError;
pub use dag::validate_dag;
pub use resolver::TerminalState;
pub use store::{InMemoryStore, Page, PgStore, PipelineFilter, PipelineStore, RunFilter};
pub use lifecycle::RunLifecycle;
pub use trigger::{DataArrivalTriggerConfig, DriftTriggerConfig, ScheduleTriggerConfig, TriggerIntake, TriggerRequest};
pub use pipelines::{CreatePipeline, PipelineService, UpdatePipeline};
pub use executor::{ExecutorConfig, RunExecutor};

#[cfg(test)]
mod lifecycle_tests;
