//! Task-level error type.

use thiserror::Error;

/// Errors returned by a task executor's `execute` method.
///
/// The run executor uses the variant to decide retry behaviour:
/// - `Retryable` — re-attempted with exponential back-off.
/// - `Fatal`     — the task is immediately recorded as failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Transient failure; the task should be re-tried.
    #[error("retryable task error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal task error: {0}")]
    Fatal(String),
}

impl TaskError {
    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}
