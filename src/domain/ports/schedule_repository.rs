use crate::domain::errors::DomainResult;
use crate::domain::models::{RecurringSchedule, WorkflowInstance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filters for querying schedules
#[derive(Default, Debug, Clone)]
pub struct ScheduleFilter {
    pub tenant_id: Option<String>,
    pub flow_type: Option<String>,
    pub is_active: Option<bool>,
    pub limit: Option<i64>,
}

/// Repository port for recurring schedule definitions.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert a new schedule, returning the store-assigned id
    async fn insert(&self, schedule: &RecurringSchedule) -> DomainResult<i64>;

    /// Get a schedule by id
    async fn get(&self, id: i64) -> DomainResult<Option<RecurringSchedule>>;

    /// Get a schedule by external code
    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<RecurringSchedule>>;

    /// Version-checked update
    async fn update(&self, schedule: &RecurringSchedule) -> DomainResult<()>;

    /// Remove a schedule definition
    async fn delete(&self, id: i64) -> DomainResult<()>;

    /// List schedules with optional filters
    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<RecurringSchedule>>;

    /// Active schedules due at `now` for non-paused tenants
    async fn list_due(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<RecurringSchedule>>;

    /// Fire a due schedule: advance its bookkeeping and create the root
    /// workflow in one atomic unit, guarded by the schedule's version token.
    /// Returns the new workflow id, or None when another worker fired the
    /// schedule first (version conflict) — never a double fire.
    async fn fire(
        &self,
        schedule: &RecurringSchedule,
        now: DateTime<Utc>,
        workflow: &WorkflowInstance,
    ) -> DomainResult<Option<i64>>;
}
