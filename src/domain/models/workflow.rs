//! Workflow domain model.
//!
//! A workflow is one top-level or nested unit of orchestrated work that
//! expands into a task DAG. Workflows are never physically deleted; they
//! only move forward until a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a workflow.
///
/// The legacy boolean flags (`is_task_creation_started`, `is_tasks_created`,
/// `is_started`, `is_completed`, `is_successful`, `is_canceled`) are derived
/// from this single enum so they cannot fall out of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Submitted, task creation has not begun
    Requested,
    /// Task-creation expansion is in progress (crash-safe resume point)
    ExpandingTasks,
    /// The full task set and its dependency edges exist
    TasksCreated,
    /// At least one task has started executing
    Started,
    /// All tasks terminal, every one of them successful
    Succeeded,
    /// All tasks terminal, at least one canceled or exhausted
    Canceled,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Requested
    }
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::ExpandingTasks => "expanding_tasks",
            Self::TasksCreated => "tasks_created",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "requested" => Some(Self::Requested),
            "expanding_tasks" => Some(Self::ExpandingTasks),
            "tasks_created" => Some(Self::TasksCreated),
            "started" => Some(Self::Started),
            "succeeded" => Some(Self::Succeeded),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<WorkflowStatus> {
        match self {
            Self::Requested => vec![Self::ExpandingTasks, Self::Canceled],
            Self::ExpandingTasks => vec![Self::TasksCreated, Self::Canceled],
            // An empty task set completes straight from TasksCreated
            Self::TasksCreated => vec![Self::Started, Self::Succeeded, Self::Canceled],
            Self::Started => vec![Self::Succeeded, Self::Canceled],
            Self::Succeeded | Self::Canceled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// One orchestrated unit of work, expanding into a task DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,
    /// External globally-unique identity
    pub code: Uuid,
    /// Optimistic-concurrency token, incremented on every durable update
    pub row_version: i64,
    /// Workflow-type name; selects the task template set to expand into
    pub flow_type: String,
    /// Owning tenant
    pub tenant_id: String,
    /// External correlation id the workflow acts upon
    pub subject_code: Uuid,
    /// Workflow that spawned this one
    pub parent_workflow_id: Option<i64>,
    /// Top-most ancestor; self if root (fixed up at insert time)
    pub root_workflow_id: i64,
    /// Another workflow that must finish before this one is expanded
    pub dependency_workflow_id: Option<i64>,
    /// Claim ordering weight, inherited by owned tasks
    pub priority_level: i32,
    /// Current status
    pub status: WorkflowStatus,
    /// Cooperative cancellation request; propagated to non-terminal tasks
    pub cancel_requested: bool,
    /// Set on a terminal workflow once it has been cloned for a manual retry
    pub is_resubmitted: bool,
    /// Per-workflow pause; the tenant-level gate lives in MaintenanceControl
    pub is_paused: bool,
    /// Debug flag propagated to task creation; no scheduling effect
    pub build_task_debug: bool,
    /// Debug flag propagated to owned tasks; no scheduling effect
    pub run_task_debug: bool,
    /// Opaque output, also carries the diagnostic on invariant violations
    pub result_value: String,
    /// Earliest eligible start
    pub min_start_at: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a new root workflow request.
    pub fn new(
        flow_type: impl Into<String>,
        tenant_id: impl Into<String>,
        subject_code: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            code: Uuid::new_v4(),
            row_version: 1,
            flow_type: flow_type.into(),
            tenant_id: tenant_id.into(),
            subject_code,
            parent_workflow_id: None,
            root_workflow_id: 0,
            dependency_workflow_id: None,
            priority_level: 0,
            status: WorkflowStatus::default(),
            cancel_requested: false,
            is_resubmitted: false,
            is_paused: false,
            build_task_debug: false,
            run_task_debug: false,
            result_value: String::new(),
            min_start_at: now,
            requested_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_parent(mut self, parent_workflow_id: i64, root_workflow_id: i64) -> Self {
        self.parent_workflow_id = Some(parent_workflow_id);
        self.root_workflow_id = root_workflow_id;
        self
    }

    pub fn with_dependency(mut self, dependency_workflow_id: i64) -> Self {
        self.dependency_workflow_id = Some(dependency_workflow_id);
        self
    }

    pub fn with_priority(mut self, priority_level: i32) -> Self {
        self.priority_level = priority_level;
        self
    }

    pub fn with_min_start(mut self, min_start_at: DateTime<Utc>) -> Self {
        self.min_start_at = min_start_at;
        self
    }

    /// Check if workflow is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derived legacy flag: expansion has been attempted.
    pub fn is_task_creation_started(&self) -> bool {
        !matches!(self.status, WorkflowStatus::Requested)
    }

    /// Derived legacy flag: the full task set exists.
    pub fn is_tasks_created(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::TasksCreated
                | WorkflowStatus::Started
                | WorkflowStatus::Succeeded
                | WorkflowStatus::Canceled
        )
    }

    /// Derived legacy flag: execution has begun.
    pub fn is_started(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Started | WorkflowStatus::Succeeded | WorkflowStatus::Canceled
        )
    }

    /// Derived legacy flag: the workflow reached a terminal state.
    pub fn is_completed(&self) -> bool {
        self.is_terminal()
    }

    /// Derived legacy flag: every owned task succeeded.
    pub fn is_successful(&self) -> bool {
        self.status == WorkflowStatus::Succeeded
    }

    /// Derived legacy flag: the workflow terminated without full success.
    pub fn is_canceled(&self) -> bool {
        self.status == WorkflowStatus::Canceled
    }

    pub fn can_transition_to(&self, new_status: WorkflowStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, maintaining timestamps.
    pub fn transition_to(&mut self, new_status: WorkflowStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        match new_status {
            WorkflowStatus::Started => self.started_at = Some(Utc::now()),
            WorkflowStatus::Succeeded | WorkflowStatus::Canceled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Clone a terminal workflow into a fresh request for a manual retry.
    ///
    /// The clone shares `root_workflow_id` with the original lineage but gets
    /// a new code and starts from `Requested`.
    pub fn clone_for_resubmit(&self) -> Result<WorkflowInstance, String> {
        if !self.is_terminal() {
            return Err(format!(
                "Cannot resubmit workflow in non-terminal state {}",
                self.status.as_str()
            ));
        }

        let now = Utc::now();
        Ok(WorkflowInstance {
            id: 0,
            code: Uuid::new_v4(),
            row_version: 1,
            flow_type: self.flow_type.clone(),
            tenant_id: self.tenant_id.clone(),
            subject_code: self.subject_code,
            parent_workflow_id: self.parent_workflow_id,
            root_workflow_id: self.root_workflow_id,
            dependency_workflow_id: None,
            priority_level: self.priority_level,
            status: WorkflowStatus::Requested,
            cancel_requested: false,
            is_resubmitted: false,
            is_paused: false,
            build_task_debug: self.build_task_debug,
            run_task_debug: self.run_task_debug,
            result_value: String::new(),
            min_start_at: now,
            requested_at: now,
            started_at: None,
            completed_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_workflow() -> WorkflowInstance {
        WorkflowInstance::new("nightly-refresh", "tenant-a", Uuid::new_v4())
    }

    #[test]
    fn test_workflow_lifecycle() {
        let mut wf = test_workflow();
        assert_eq!(wf.status, WorkflowStatus::Requested);
        assert!(!wf.is_task_creation_started());

        wf.transition_to(WorkflowStatus::ExpandingTasks).unwrap();
        assert!(wf.is_task_creation_started());
        assert!(!wf.is_tasks_created());

        wf.transition_to(WorkflowStatus::TasksCreated).unwrap();
        assert!(wf.is_tasks_created());

        wf.transition_to(WorkflowStatus::Started).unwrap();
        assert!(wf.started_at.is_some());

        wf.transition_to(WorkflowStatus::Succeeded).unwrap();
        assert!(wf.is_completed());
        assert!(wf.is_successful());
        assert!(wf.completed_at.is_some());
    }

    #[test]
    fn test_completed_implies_successful_or_canceled() {
        let mut succeeded = test_workflow();
        succeeded.transition_to(WorkflowStatus::ExpandingTasks).unwrap();
        succeeded.transition_to(WorkflowStatus::TasksCreated).unwrap();
        succeeded.transition_to(WorkflowStatus::Succeeded).unwrap();
        assert!(succeeded.is_completed() && (succeeded.is_successful() || succeeded.is_canceled()));

        let mut canceled = test_workflow();
        canceled.transition_to(WorkflowStatus::Canceled).unwrap();
        assert!(canceled.is_completed() && canceled.is_canceled() && !canceled.is_successful());
        assert!(canceled.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_permanent() {
        let mut wf = test_workflow();
        wf.transition_to(WorkflowStatus::Canceled).unwrap();
        assert!(wf.transition_to(WorkflowStatus::Requested).is_err());
        assert!(wf.transition_to(WorkflowStatus::Started).is_err());
    }

    #[test]
    fn test_resubmit_requires_terminal_state() {
        let wf = test_workflow();
        assert!(wf.clone_for_resubmit().is_err());

        let mut done = test_workflow();
        done.id = 7;
        done.root_workflow_id = 7;
        done.transition_to(WorkflowStatus::Canceled).unwrap();

        let clone = done.clone_for_resubmit().unwrap();
        assert_eq!(clone.status, WorkflowStatus::Requested);
        assert_eq!(clone.root_workflow_id, 7);
        assert_ne!(clone.code, done.code);
        assert_eq!(clone.id, 0);
    }
}
