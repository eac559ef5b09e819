//! `MockExecutor` — a test double for `TaskExecutor`.
//!
//! Useful in unit and integration tests where a real executor is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{TaskContext, TaskError, TaskExecutor, TaskOutput};

/// Behaviour injected into `MockExecutor` at construction time.
pub enum MockBehaviour {
    /// Succeed with the given log line.
    Succeed(String),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with a `Retryable` error for the first `failures` calls, then succeed.
    Flaky { failures: usize },
}

/// A mock executor that records every call it receives and returns a
/// programmer-specified result.
pub struct MockExecutor {
    /// Label used in test assertions.
    pub name: String,
    /// What the executor will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Sleep before answering, to keep tasks in flight.
    pub delay: Option<Duration>,
    /// Task ids seen by this executor (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds.
    pub fn succeeding(name: impl Into<String>) -> Self {
        let name = name.into();
        let logs = format!("{name} ok");
        Self::with_behaviour(name, MockBehaviour::Succeed(logs))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that fails `failures` times with a `Retryable` error and
    /// then succeeds.
    pub fn flaky(name: impl Into<String>, failures: usize) -> Self {
        Self::with_behaviour(name, MockBehaviour::Flaky { failures })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this executor has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Task ids this executor has been called with.
    pub fn called_tasks(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ctx.task_id.clone());
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            MockBehaviour::Succeed(logs) => Ok(TaskOutput::with_logs(logs.clone())),
            MockBehaviour::FailRetryable(msg) => Err(TaskError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(TaskError::Fatal(msg.clone())),
            MockBehaviour::Flaky { failures } if attempt <= *failures => Err(TaskError::Retryable(
                format!("{} transient failure #{attempt}", self.name),
            )),
            MockBehaviour::Flaky { .. } => Ok(TaskOutput::with_logs(format!("{} ok", self.name))),
        }
    }
}
