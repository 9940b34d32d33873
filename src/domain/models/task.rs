//! Task domain model.
//!
//! Tasks are discrete, retryable units of work owned by a workflow.
//! They form a DAG through predecessor edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is created but predecessors are not yet terminal-successful
    Pending,
    /// Task is ready to be claimed (predecessors met)
    Eligible,
    /// Task is claimed and currently being executed by a worker
    Running,
    /// Task completed successfully
    Succeeded,
    /// Task failed and exhausted its retry budget
    Exhausted,
    /// Task was canceled
    Canceled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Eligible => "eligible",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "eligible" => Some(Self::Eligible),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "exhausted" => Some(Self::Exhausted),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Canceled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Eligible, Self::Canceled],
            Self::Eligible => vec![Self::Running, Self::Canceled],
            // Running -> Eligible is the retry path
            Self::Running => vec![Self::Succeeded, Self::Eligible, Self::Exhausted, Self::Canceled],
            Self::Succeeded | Self::Exhausted | Self::Canceled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Result of one execution attempt, as reported by the executor port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The attempt succeeded with an opaque result value.
    Succeeded { result_value: String },
    /// The attempt failed transiently; the retry loop decides what happens next.
    RetryableFailure { reason: String },
    /// The executor observed the cancellation signal and stopped.
    Canceled,
}

/// A schedulable, retryable unit of work within a workflow.
///
/// `param_1`, `param_2` and `result_value` are opaque to the engine; the
/// executor owns their meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,
    /// External globally-unique identity
    pub code: Uuid,
    /// Optimistic-concurrency token, incremented on every durable update
    pub row_version: i64,
    /// Owning workflow
    pub workflow_id: i64,
    /// Task template name within the workflow type
    pub task_type: String,
    /// Denormalized copy of the owning workflow's subject
    pub subject_code: Uuid,
    /// Denormalized copy of the owning workflow's priority for claim ordering
    pub priority_level: i32,
    /// Inline single-predecessor edge (degenerate case of the join table)
    pub predecessor_task_id: Option<i64>,
    /// Current status
    pub status: TaskStatus,
    /// Cooperative cancellation request; observed at the next state check
    pub cancel_requested: bool,
    /// If false, no sibling task of the same workflow may run concurrently
    pub parallel_allowed: bool,
    /// Attempts consumed so far
    pub retry_count: u32,
    /// Retry budget
    pub max_retry_count: u32,
    /// Worker that currently owns (or last owned) the claim
    pub processor_id: Option<String>,
    /// Debug flag propagated from the workflow; no scheduling effect
    pub run_task_debug: bool,
    /// Opaque input
    pub param_1: String,
    /// Opaque input
    pub param_2: String,
    /// Opaque output
    pub result_value: String,
    /// Earliest eligible start
    pub min_start_at: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskInstance {
    /// Create a new pending task for a workflow.
    pub fn new(workflow_id: i64, task_type: impl Into<String>, subject_code: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            code: Uuid::new_v4(),
            row_version: 1,
            workflow_id,
            task_type: task_type.into(),
            subject_code,
            priority_level: 0,
            predecessor_task_id: None,
            status: TaskStatus::default(),
            cancel_requested: false,
            parallel_allowed: true,
            retry_count: 0,
            max_retry_count: 3,
            processor_id: None,
            run_task_debug: false,
            param_1: String::new(),
            param_2: String::new(),
            result_value: String::new(),
            min_start_at: now,
            requested_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority_level: i32) -> Self {
        self.priority_level = priority_level;
        self
    }

    pub fn with_predecessor(mut self, predecessor_task_id: i64) -> Self {
        self.predecessor_task_id = Some(predecessor_task_id);
        self
    }

    pub fn with_params(mut self, param_1: impl Into<String>, param_2: impl Into<String>) -> Self {
        self.param_1 = param_1.into();
        self.param_2 = param_2.into();
        self
    }

    pub fn with_retry_budget(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    pub fn with_parallel_allowed(mut self, parallel_allowed: bool) -> Self {
        self.parallel_allowed = parallel_allowed;
        self
    }

    pub fn with_min_start(mut self, min_start_at: DateTime<Utc>) -> Self {
        self.min_start_at = min_start_at;
        self
    }

    /// Check if task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derived legacy flag: an attempt has started at least once.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Derived legacy flag: the task reached a terminal state.
    pub fn is_completed(&self) -> bool {
        self.is_terminal()
    }

    /// Derived legacy flag: the task completed successfully.
    pub fn is_successful(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    /// Derived legacy flag: the task was canceled.
    pub fn is_canceled(&self) -> bool {
        self.status == TaskStatus::Canceled
    }

    /// Whether another retry attempt is available.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retry_count
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, maintaining timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        match new_status {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            TaskStatus::Succeeded | TaskStatus::Exhausted | TaskStatus::Canceled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Apply an execution outcome to a running task.
    ///
    /// A retryable failure consumes one attempt and returns the task to the
    /// eligible pool while budget remains; the claim is released either way.
    pub fn apply_outcome(&mut self, outcome: &TaskOutcome) -> Result<(), String> {
        match outcome {
            TaskOutcome::Succeeded { result_value } => {
                self.transition_to(TaskStatus::Succeeded)?;
                self.result_value = result_value.clone();
            }
            TaskOutcome::RetryableFailure { reason } => {
                if self.can_retry() {
                    self.retry_count += 1;
                    self.transition_to(TaskStatus::Eligible)?;
                    self.processor_id = None;
                } else {
                    self.transition_to(TaskStatus::Exhausted)?;
                    self.result_value = reason.clone();
                }
            }
            TaskOutcome::Canceled => {
                self.transition_to(TaskStatus::Canceled)?;
            }
        }
        Ok(())
    }

    /// Whether a worker may attempt a claim right now, ignoring siblings.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Eligible && !self.cancel_requested && self.min_start_at <= now
    }
}
