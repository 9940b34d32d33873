//! Worker CLI command: host the claim/dispatch loop and the recurring
//! scheduler in one process until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::info;

use crate::application::{Scheduler, Worker};
use crate::domain::ports::{NullTaskExecutor, TaskExecutor};
use crate::infrastructure::default_processor_id;

use super::init_engine;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Stable worker identity; defaults to host-pid
    #[arg(long)]
    pub processor_id: Option<String>,

    /// Skip the recurring-scheduler loop in this process
    #[arg(long)]
    pub no_scheduler: bool,
}

pub async fn execute(args: WorkerArgs, config: Option<&PathBuf>, _json: bool) -> Result<()> {
    let (config, engine) = init_engine(config).await?;

    let processor_id = args
        .processor_id
        .or_else(|| config.worker.processor_id.clone())
        .unwrap_or_else(default_processor_id);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The engine is executor-agnostic; the bundled executor completes task
    // bodies immediately. Real deployments link their own TaskExecutor.
    let executor: Arc<dyn TaskExecutor> = Arc::new(NullTaskExecutor::new());

    let worker = Worker::new(
        processor_id.clone(),
        config.worker.clone(),
        Arc::clone(&engine.workflows),
        Arc::clone(&engine.tasks),
        Arc::clone(&engine.workflow_service),
        Arc::clone(&engine.task_lifecycle),
        Arc::clone(&engine.maintenance_service),
        executor,
        shutdown_rx.clone(),
    );

    let worker_handle = tokio::spawn(worker.run());

    let scheduler_handle = if !args.no_scheduler {
        let scheduler = Scheduler::new(
            Arc::clone(&engine.schedule_service),
            Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
            shutdown_rx,
        );
        Some(tokio::spawn(scheduler.run()))
    } else {
        None
    };

    info!(processor_id = %processor_id, "Running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown_tx.send(true)?;
    worker_handle.await?;
    if let Some(handle) = scheduler_handle {
        handle.await?;
    }

    Ok(())
}
