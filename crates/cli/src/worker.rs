//! Background worker: claims pending runs and drives them to completion.

use std::sync::Arc;

use engine::{Caller, PipelineStore, RunExecutor};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::WorkerArgs;

pub async fn run(
    store: Arc<dyn PipelineStore>,
    executor: Arc<RunExecutor>,
    args: &WorkerArgs,
) -> anyhow::Result<()> {
    info!(
        "worker started (poll every {:?}, batch of {})",
        args.poll_interval(),
        args.batch_size
    );

    loop {
        let pending = store.list_pending_runs(args.batch_size).await?;

        if pending.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(args.poll_interval()) => continue,
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        let mut drivers = JoinSet::new();
        for run in pending {
            let executor = Arc::clone(&executor);
            drivers.spawn(async move {
                let caller = Caller::system(run.tenant_id);
                (run.id, executor.drive(&caller, run.id).await)
            });
        }

        while let Some(joined) = drivers.join_next().await {
            match joined {
                Ok((run_id, Ok(snapshot))) => {
                    info!(run_id = %run_id, status = %snapshot.run.status, "run processed");
                }
                Ok((run_id, Err(e))) => error!(run_id = %run_id, "run driver failed: {e}"),
                Err(e) => error!("run driver panicked: {e}"),
            }
        }
    }

    info!("worker shutting down");
    Ok(())
}
