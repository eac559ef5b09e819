//! `executors` crate — the `TaskExecutor` trait, the registry that maps a
//! task's `task_type` onto an implementation, and the built-in executors.
//!
//! The orchestration core never runs task code itself. Every task type —
//! built-in and external alike — is reached through [`TaskExecutor`].

pub mod error;
pub mod traits;
pub mod registry;
pub mod builtin;
pub mod mock;

pub use error::TaskError;
pub use registry::ExecutorRegistry;
pub use traits::{TaskContext, TaskExecutor, TaskOutput};
