use crate::domain::errors::DomainResult;
use crate::domain::models::{WorkflowInstance, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filters for querying workflows
#[derive(Default, Debug, Clone)]
pub struct WorkflowFilter {
    pub tenant_id: Option<String>,
    pub flow_type: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub root_workflow_id: Option<i64>,
    pub parent_workflow_id: Option<i64>,
    pub cancel_requested: Option<bool>,
    pub limit: Option<i64>,
}

/// Repository port for workflow persistence.
///
/// `update` is version-checked: it fails with `DomainError::Conflict` when
/// the row's version no longer matches the one that was read, and bumps the
/// version on success. Workflows are never deleted.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Insert a new workflow, returning the store-assigned id. A root
    /// workflow (root_workflow_id == 0) has its root fixed to itself.
    async fn insert(&self, workflow: &WorkflowInstance) -> DomainResult<i64>;

    /// Get a workflow by id
    async fn get(&self, id: i64) -> DomainResult<Option<WorkflowInstance>>;

    /// Get a workflow by external code
    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<WorkflowInstance>>;

    /// Version-checked update of all mutable columns
    async fn update(&self, workflow: &WorkflowInstance) -> DomainResult<()>;

    /// List workflows with optional filters
    async fn list(&self, filter: WorkflowFilter) -> DomainResult<Vec<WorkflowInstance>>;

    /// Count workflows matching filters
    async fn count(&self, filter: WorkflowFilter) -> DomainResult<i64>;

    /// Workflows awaiting task creation for non-paused tenants: status
    /// Requested or ExpandingTasks, min start reached, and any dependency
    /// workflow already terminal.
    async fn list_expandable(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<WorkflowInstance>>;

    /// Non-terminal workflows of a tenant with tasks created; the
    /// maintenance sweep re-runs the resolver over these.
    async fn list_active_for_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> DomainResult<Vec<WorkflowInstance>>;
}
