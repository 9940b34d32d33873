use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskDependency, TaskInstance, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub workflow_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub processor_id: Option<String>,
    pub limit: Option<i64>,
}

/// Repository port for task persistence, including dependency edges.
///
/// Tasks own their join-table dependency rows, so edge operations live
/// here. All mutation is version-checked; the claim operations are the
/// compare-and-swap primitives the dispatch loop and reaper are built on.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert one task, returning the store-assigned id
    async fn insert(&self, task: &TaskInstance) -> DomainResult<i64>;

    /// Insert a batch of tasks in one transaction, returning assigned ids
    /// in input order
    async fn insert_bulk(&self, tasks: &[TaskInstance]) -> DomainResult<Vec<i64>>;

    /// Get a task by id
    async fn get(&self, id: i64) -> DomainResult<Option<TaskInstance>>;

    /// Get a task by external code
    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<TaskInstance>>;

    /// Version-checked update of all mutable columns
    async fn update(&self, task: &TaskInstance) -> DomainResult<()>;

    /// Version-checked update of a batch in one transaction; a stale row
    /// rolls the whole batch back with a Conflict
    async fn update_bulk(&self, tasks: &[TaskInstance]) -> DomainResult<()>;

    /// List tasks with optional filters
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<TaskInstance>>;

    /// Count tasks matching filters
    async fn count(&self, filter: TaskFilter) -> DomainResult<i64>;

    /// All tasks owned by a workflow
    async fn list_by_workflow(&self, workflow_id: i64) -> DomainResult<Vec<TaskInstance>>;

    /// Tasks that depend on the given predecessor, through the inline
    /// column or a resolved join edge
    async fn list_by_predecessor(&self, predecessor_task_id: i64)
        -> DomainResult<Vec<TaskInstance>>;

    /// Eligible, claimable tasks for non-paused tenants ordered by
    /// (priority_level DESC, min_start_at ASC, id ASC)
    async fn list_claim_candidates(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<TaskInstance>>;

    /// Atomically claim an eligible task for a worker: Eligible -> Running
    /// with `processor_id` and `started_at` set, guarded by the version
    /// token and the sibling parallel-run exclusion. Returns the claimed row,
    /// or None when the race was lost or the task is no longer claimable.
    async fn claim(
        &self,
        task: &TaskInstance,
        processor_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<TaskInstance>>;

    /// Running tasks whose `started_at` is older than the threshold
    async fn list_stale_running(
        &self,
        tenant_id: &str,
        older_than: DateTime<Utc>,
    ) -> DomainResult<Vec<TaskInstance>>;

    /// Insert dependency edges (resolved or placeholder) in one transaction
    async fn insert_dependencies(&self, edges: &[TaskDependency]) -> DomainResult<()>;

    /// All dependency edges of a workflow
    async fn list_dependencies(&self, workflow_id: i64) -> DomainResult<Vec<TaskDependency>>;

    /// Convert placeholder edges of a workflow into resolved edges using a
    /// (task_type -> task id) mapping produced by expansion
    async fn resolve_placeholders(
        &self,
        workflow_id: i64,
        mapping: &[(String, i64)],
    ) -> DomainResult<usize>;
}
