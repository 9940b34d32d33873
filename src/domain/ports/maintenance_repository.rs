use crate::domain::errors::DomainResult;
use crate::domain::models::MaintenanceControl;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository port for per-tenant maintenance control rows.
#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    /// Insert a control row for a tenant, returning the store-assigned id
    async fn insert(&self, control: &MaintenanceControl) -> DomainResult<i64>;

    /// Get the control row for a tenant
    async fn get_by_tenant(&self, tenant_id: &str) -> DomainResult<Option<MaintenanceControl>>;

    /// All control rows
    async fn list(&self) -> DomainResult<Vec<MaintenanceControl>>;

    /// Tenants currently paused; read by the claim loop and the scheduler
    /// before each batch
    async fn list_paused_tenants(&self) -> DomainResult<Vec<String>>;

    /// Version-checked update
    async fn update(&self, control: &MaintenanceControl) -> DomainResult<()>;

    /// Atomically take ownership of a tenant's maintenance sweep, guarded by
    /// the version token so at most one worker holds it. Returns the updated
    /// row, or None when the claim was lost.
    async fn claim_sweep(
        &self,
        control: &MaintenanceControl,
        processor_id: &str,
    ) -> DomainResult<Option<MaintenanceControl>>;

    /// Release a sweep owned by `control.sweep_processor_id`, advancing the
    /// heartbeat to `next_sweep_at`
    async fn complete_sweep(
        &self,
        control: &MaintenanceControl,
        now: DateTime<Utc>,
        next_sweep_at: DateTime<Utc>,
    ) -> DomainResult<()>;
}
