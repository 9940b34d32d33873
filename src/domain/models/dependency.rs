//! Dependency edge domain model.
//!
//! An edge states that a task may not start until a named predecessor task
//! in the same workflow reaches a terminal successful state. Edges exist in
//! two persisted forms — the inline `predecessor_task_id` column on the task
//! row and join-table rows — and both feed one resolution interface.

use serde::{Deserialize, Serialize};

/// A directed dependency edge between two tasks of one workflow.
///
/// While the predecessor task row does not exist yet (mid-expansion), the
/// edge is a placeholder carrying the predecessor's task_type in
/// `predecessor_ref`. Placeholder edges are never treated as satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,
    /// Owning workflow; both endpoints live in it
    pub workflow_id: i64,
    /// The dependent task
    pub task_id: i64,
    /// The predecessor task; None while the edge is a placeholder
    pub predecessor_task_id: Option<i64>,
    /// Predecessor task_type, used to resolve placeholders after expansion
    pub predecessor_ref: Option<String>,
    /// True until the referenced predecessor row exists
    pub placeholder: bool,
}

impl TaskDependency {
    /// Create a resolved edge between two existing tasks.
    pub fn new(workflow_id: i64, task_id: i64, predecessor_task_id: i64) -> Self {
        Self {
            id: 0,
            workflow_id,
            task_id,
            predecessor_task_id: Some(predecessor_task_id),
            predecessor_ref: None,
            placeholder: false,
        }
    }

    /// Create a placeholder edge naming a predecessor that is not yet
    /// materialized.
    pub fn placeholder(
        workflow_id: i64,
        task_id: i64,
        predecessor_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            workflow_id,
            task_id,
            predecessor_task_id: None,
            predecessor_ref: Some(predecessor_ref.into()),
            placeholder: true,
        }
    }

    /// Fill in the materialized predecessor, clearing the placeholder flag.
    pub fn resolve(&mut self, predecessor_task_id: i64) {
        self.predecessor_task_id = Some(predecessor_task_id);
        self.placeholder = false;
    }
}
