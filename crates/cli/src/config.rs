//! Runtime settings. Every flag can also be supplied through the
//! environment variable named next to it.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use db::{DbPool, PoolSettings};
use engine::ExecutorConfig;

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Seconds to wait for a free pooled connection.
    #[arg(long, env = "DATABASE_ACQUIRE_TIMEOUT_SECS", default_value_t = 30)]
    pub acquire_timeout_secs: u64,
}

impl DatabaseArgs {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }

    pub async fn connect(&self) -> anyhow::Result<DbPool> {
        db::pool::create_pool(&self.database_url, &self.pool_settings())
            .await
            .context("failed to connect to database")
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExecutionArgs {
    /// Retries for a task failing with a retryable error.
    #[arg(long, env = "TASK_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base of the exponential back-off between retries.
    #[arg(long, env = "TASK_RETRY_BASE_DELAY_MS", default_value_t = 100)]
    pub retry_base_delay_ms: u64,

    /// Cap on tasks of one run executing at once (unbounded if unset).
    #[arg(long, env = "TASK_MAX_PARALLELISM")]
    pub max_parallelism: Option<usize>,
}

impl ExecutionArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_parallelism: self.max_parallelism,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Sleep between polls when no run is pending.
    #[arg(long, env = "WORKER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Pending runs claimed per poll.
    #[arg(long, env = "WORKER_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: i64,
}

impl WorkerArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        execution: ExecutionArgs,
        #[command(flatten)]
        worker: WorkerArgs,
    }

    #[test]
    fn defaults_match_executor_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        let config = cli.execution.executor_config();
        let defaults = ExecutorConfig::default();

        assert_eq!(config.max_retries, defaults.max_retries);
        assert_eq!(config.retry_base_delay, defaults.retry_base_delay);
        assert_eq!(config.max_parallelism, None);
        assert_eq!(cli.worker.poll_interval(), Duration::from_secs(1));
        assert_eq!(cli.worker.batch_size, 10);
    }

    #[test]
    fn database_flags_map_onto_pool_settings() {
        #[derive(Parser)]
        struct DbCli {
            #[command(flatten)]
            database: DatabaseArgs,
        }

        let cli = DbCli::try_parse_from(["test", "--database-url", "postgres://localhost/orchestrator"]).unwrap();
        let settings = cli.database.pool_settings();
        let defaults = PoolSettings::default();
        assert_eq!(settings.max_connections, defaults.max_connections);
        assert_eq!(settings.acquire_timeout, defaults.acquire_timeout);

        let cli = DbCli::try_parse_from([
            "test",
            "--database-url",
            "postgres://localhost/orchestrator",
            "--acquire-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.database.pool_settings().acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--max-retries",
            "5",
            "--max-parallelism",
            "2",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(cli.execution.max_retries, 5);
        assert_eq!(cli.execution.executor_config().max_parallelism, Some(2));
        assert_eq!(cli.worker.poll_interval(), Duration::from_millis(250));
    }
}
