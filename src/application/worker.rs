//! Claim/dispatch worker loop.
//!
//! Each worker process runs this loop independently; the only coordination
//! between workers is the version-checked claim at the persistence
//! boundary. A pass expands due workflows, claims eligible tasks in
//! priority order, hands them to the executor, and — when it wins a
//! tenant's maintenance-sweep heartbeat — reaps stale claims and re-runs
//! the resolver over that tenant's active workflows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskInstance, TaskOutcome, WorkerConfig};
use crate::domain::ports::{TaskExecutor, TaskRepository, WorkflowRepository};
use crate::services::{MaintenanceService, TaskLifecycleService, WorkflowService};

/// Counters from one worker pass, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPassStats {
    pub expanded: usize,
    pub claimed: usize,
    pub completed: usize,
    pub reaped: usize,
    pub swept: usize,
}

pub struct Worker {
    processor_id: String,
    config: WorkerConfig,
    workflows: Arc<dyn WorkflowRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflow_service: Arc<WorkflowService>,
    task_lifecycle: Arc<TaskLifecycleService>,
    maintenance_service: Arc<MaintenanceService>,
    executor: Arc<dyn TaskExecutor>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processor_id: String,
        config: WorkerConfig,
        workflows: Arc<dyn WorkflowRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflow_service: Arc<WorkflowService>,
        task_lifecycle: Arc<TaskLifecycleService>,
        maintenance_service: Arc<MaintenanceService>,
        executor: Arc<dyn TaskExecutor>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            processor_id,
            config,
            workflows,
            tasks,
            workflow_service,
            task_lifecycle,
            maintenance_service,
            executor,
            shutdown,
        }
    }

    pub fn processor_id(&self) -> &str {
        &self.processor_id
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self) {
        info!(processor_id = %self.processor_id, "Worker started");
        let mut shutdown = self.shutdown.clone();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(stats) => {
                            if stats != WorkerPassStats::default() {
                                debug!(?stats, "Worker pass finished");
                            }
                        }
                        // Only the store being unreachable lands here; per-item
                        // failures are contained inside the pass.
                        Err(e) => error!(error = %e, "Worker pass failed"),
                    }
                }
            }
        }
        info!(processor_id = %self.processor_id, "Worker stopped");
    }

    /// One full pass: expand, claim/dispatch, sweep.
    #[instrument(skip(self), fields(processor_id = %self.processor_id), err)]
    pub async fn run_once(&self) -> DomainResult<WorkerPassStats> {
        let mut stats = WorkerPassStats::default();
        let now = Utc::now();
        let paused = self.maintenance_service.paused_tenants().await?;

        // Expansion phase: workflows awaiting task creation
        let expandable = self
            .workflows
            .list_expandable(&paused, now, self.config.claim_batch_size as i64)
            .await?;
        for workflow in expandable {
            match self.workflow_service.expand(workflow.id).await {
                Ok(created) if created > 0 => stats.expanded += 1,
                Ok(_) => {}
                // Contained at the workflow boundary; the workflow is
                // already failed with a diagnostic
                Err(e) => warn!(workflow_id = workflow.id, error = %e, "Expansion failed"),
            }
        }

        // Claim/dispatch phase
        let candidates = self
            .tasks
            .list_claim_candidates(&paused, now, self.config.claim_batch_size as i64)
            .await?;
        for candidate in candidates {
            match self.tasks.claim(&candidate, &self.processor_id, Utc::now()).await? {
                Some(claimed) => {
                    stats.claimed += 1;
                    if let Err(e) = self.dispatch(claimed).await {
                        warn!(task_id = candidate.id, error = %e, "Dispatch failed");
                    } else {
                        stats.completed += 1;
                    }
                }
                // Lost the race or the task stopped being claimable;
                // abandon the candidate
                None => debug!(task_id = candidate.id, "Claim lost"),
            }
        }

        // Maintenance sweep phase: reap stale claims and re-run the
        // resolver, at most one worker per tenant at a time
        for control in self.maintenance_service.list().await? {
            if control.is_paused {
                continue;
            }
            let Some(held) = self
                .maintenance_service
                .try_claim_sweep(&control, &self.processor_id, now)
                .await?
            else {
                continue;
            };

            let reaped = self.sweep_tenant(&held.tenant_id).await?;
            stats.reaped += reaped;
            stats.swept += 1;

            self.maintenance_service
                .finish_sweep(
                    &held,
                    Utc::now(),
                    chrono::Duration::seconds(self.config.sweep_interval_secs as i64),
                )
                .await?;
        }

        Ok(stats)
    }

    /// Reap stale running tasks for a tenant and refresh its active
    /// workflows. Returns the number of reaped tasks.
    async fn sweep_tenant(&self, tenant_id: &str) -> DomainResult<usize> {
        let deadline = Utc::now() - chrono::Duration::seconds(self.config.stale_task_secs as i64);
        let stale = self.tasks.list_stale_running(tenant_id, deadline).await?;

        let mut reaped = 0usize;
        for task in &stale {
            if self.task_lifecycle.reap(task, Utc::now()).await? {
                reaped += 1;
                self.workflow_service.refresh(task.workflow_id).await?;
            }
        }

        for workflow in self.workflows.list_active_for_tenant(tenant_id, i64::MAX).await? {
            if let Err(e) = self.workflow_service.refresh(workflow.id).await {
                warn!(workflow_id = workflow.id, error = %e, "Refresh failed during sweep");
            }
        }

        Ok(reaped)
    }

    /// Execute one claimed task and feed its outcome back into the state
    /// machines. Cancellation is cooperative: a background monitor watches
    /// the row's cancel flag and fires the token the executor holds.
    async fn dispatch(&self, task: TaskInstance) -> DomainResult<()> {
        if task.cancel_requested {
            self.task_lifecycle.finalize(task.id, &TaskOutcome::Canceled).await?;
            self.workflow_service.refresh(task.workflow_id).await?;
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(watch_for_cancel(
            Arc::clone(&self.tasks),
            task.id,
            cancel.clone(),
            Duration::from_secs(self.config.cancel_poll_secs.max(1)),
            self.shutdown.clone(),
        ));

        let outcome = self.executor.execute(&task, cancel.clone()).await;

        cancel.cancel();
        let _ = monitor.await;

        self.task_lifecycle.finalize(task.id, &outcome).await?;
        self.workflow_service.refresh(task.workflow_id).await?;
        Ok(())
    }
}

/// Poll a running task's cancel flag, firing the token when cancellation is
/// requested or the process shuts down.
async fn watch_for_cancel(
    tasks: Arc<dyn TaskRepository>,
    task_id: i64,
    cancel: CancellationToken,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    cancel.cancel();
                    return;
                }
            }
            () = tokio::time::sleep(poll_interval) => {
                match tasks.get(task_id).await {
                    Ok(Some(task)) if task.cancel_requested => {
                        cancel.cancel();
                        return;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => return,
                    Err(e) => debug!(task_id, error = %e, "Cancel poll failed"),
                }
            }
        }
    }
}
