//! Built-in executors available in every registry.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{TaskContext, TaskError, TaskExecutor, TaskOutput};

/// Succeeds immediately. Useful for structural tasks (fan-in joins, markers)
/// and for dry-running a DAG.
pub struct NoopExecutor;

impl NoopExecutor {
    pub const TASK_TYPE: &'static str = "noop";
}

#[async_trait]
impl TaskExecutor for NoopExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        debug!(task_id = %ctx.task_id, "noop task");
        let config = serde_json::to_string(&ctx.config)
            .map_err(|e| TaskError::Fatal(format!("config is not serializable: {e}")))?;
        Ok(TaskOutput::with_logs(format!("noop task '{}' config={config}", ctx.task_id)))
    }
}

/// Runs `config.command` through a shell.
///
/// Config keys:
/// - `command` (required) — the command line.
/// - `shell` — the shell binary, `sh` when absent.
///
/// The run id, task id and every string run parameter are exported to the
/// child as environment variables (`PIPELINE_RUN_ID`, `PIPELINE_TASK_ID`,
/// `PARAM_<NAME>`).
pub struct ShellExecutor {
    default_shell: String,
}

impl ShellExecutor {
    pub const TASK_TYPE: &'static str = "shell";

    pub fn new(default_shell: impl Into<String>) -> Self {
        Self { default_shell: default_shell.into() }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let command = ctx
            .config_str("command")
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TaskError::Fatal("shell task requires a non-empty 'command'".into()))?;
        let shell = ctx.config_str("shell").unwrap_or(&self.default_shell);

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        cmd.env("PIPELINE_RUN_ID", ctx.run_id.to_string());
        cmd.env("PIPELINE_TASK_ID", &ctx.task_id);
        for (key, value) in &ctx.parameters {
            if let Some(s) = value.as_str() {
                cmd.env(format!("PARAM_{}", key.to_uppercase()), s);
            }
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| TaskError::Fatal(format!("failed to spawn '{shell}': {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let logs = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}{stderr}")
        };

        if output.status.success() {
            Ok(TaskOutput::with_logs(logs))
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(TaskError::Fatal(format!(
                "command exited with status {code}: {}",
                stderr.trim()
            )))
        }
    }
}
