//! Task lifecycle service.
//!
//! Applies execution outcomes, cancellation requests, and stale-claim
//! recovery to task rows. Every mutation goes through the version-checked
//! update path; a conflict means the row moved underneath us and the
//! operation re-reads and retries, or reports that it lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskInstance, TaskOutcome, TaskStatus};
use crate::domain::ports::TaskRepository;

pub struct TaskLifecycleService {
    tasks: Arc<dyn TaskRepository>,
}

impl TaskLifecycleService {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    /// Finalize a running task with its execution outcome.
    ///
    /// A cancellation request observed here wins over a retryable failure:
    /// the task is canceled instead of getting another attempt. Returns the
    /// task as persisted. If the task is no longer running (the reaper beat
    /// us to it), the row is returned untouched.
    #[instrument(skip(self, outcome), err)]
    pub async fn finalize(&self, task_id: i64, outcome: &TaskOutcome) -> DomainResult<TaskInstance> {
        loop {
            let mut task = self
                .tasks
                .get(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;

            if task.status != TaskStatus::Running {
                warn!(
                    task_id,
                    status = task.status.as_str(),
                    "Task no longer running at finalize; keeping current state"
                );
                return Ok(task);
            }

            let effective = if task.cancel_requested
                && matches!(outcome, TaskOutcome::RetryableFailure { .. })
            {
                TaskOutcome::Canceled
            } else {
                outcome.clone()
            };

            task.apply_outcome(&effective).map_err(|reason| {
                DomainError::InvalidStateTransition {
                    from: TaskStatus::Running.as_str().to_string(),
                    to: format!("{effective:?}"),
                    reason,
                }
            })?;

            match self.tasks.update(&task).await {
                Ok(()) => {
                    info!(task_id, status = task.status.as_str(), "Task finalized");
                    return Ok(self
                        .tasks
                        .get(task_id)
                        .await?
                        .ok_or(DomainError::TaskNotFound(task_id))?);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Request cooperative cancellation of a task.
    ///
    /// A task that is not currently running is canceled on the spot; a
    /// running one is finalized once its executor returns or the reaper
    /// deadline passes.
    #[instrument(skip(self), err)]
    pub async fn request_cancel(&self, task_id: i64) -> DomainResult<()> {
        loop {
            let mut task = self
                .tasks
                .get(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;

            if task.is_terminal() {
                return Ok(());
            }

            task.cancel_requested = true;
            if task.status != TaskStatus::Running {
                // Safe to cancel immediately; no attempt is in flight
                let _ = task.transition_to(TaskStatus::Canceled);
            }

            match self.tasks.update(&task).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Recover one stale claim: a Running task whose `started_at` is past
    /// the staleness deadline is treated as a retryable failure.
    ///
    /// Guarded by the stale row's version so a finalize racing in (or a
    /// second reaper) makes exactly one of the writers win. Returns whether
    /// this call recovered the task.
    #[instrument(skip(self, task), fields(task_id = task.id), err)]
    pub async fn reap(&self, task: &TaskInstance, now: DateTime<Utc>) -> DomainResult<bool> {
        let mut reclaimed = task.clone();

        let outcome = if reclaimed.cancel_requested {
            TaskOutcome::Canceled
        } else {
            TaskOutcome::RetryableFailure {
                reason: format!(
                    "claim by {} expired",
                    reclaimed.processor_id.as_deref().unwrap_or("unknown")
                ),
            }
        };

        if reclaimed.apply_outcome(&outcome).is_err() {
            return Ok(false);
        }

        match self.tasks.update(&reclaimed).await {
            Ok(()) => {
                warn!(
                    task_id = task.id,
                    started_at = %task.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    now = %now.to_rfc3339(),
                    status = reclaimed.status.as_str(),
                    "Reaped stale running task"
                );
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
