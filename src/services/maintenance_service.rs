//! Maintenance controller service.
//!
//! Per-tenant pause/resume with audit fields, and the heartbeat claim that
//! lets at most one worker run a tenant's maintenance sweep at a time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MaintenanceControl;
use crate::domain::ports::MaintenanceRepository;

pub struct MaintenanceService {
    maintenance: Arc<dyn MaintenanceRepository>,
}

impl MaintenanceService {
    pub fn new(maintenance: Arc<dyn MaintenanceRepository>) -> Self {
        Self { maintenance }
    }

    /// Get or create the control row for a tenant.
    pub async fn ensure_tenant(&self, tenant_id: &str) -> DomainResult<MaintenanceControl> {
        if let Some(control) = self.maintenance.get_by_tenant(tenant_id).await? {
            return Ok(control);
        }
        let control = MaintenanceControl::new(tenant_id);
        if let Err(e) = self.maintenance.insert(&control).await {
            // Lost an insert race on the unique tenant constraint
            if let Some(existing) = self.maintenance.get_by_tenant(tenant_id).await? {
                return Ok(existing);
            }
            return Err(e);
        }
        self.maintenance
            .get_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| DomainError::TenantNotFound(tenant_id.to_string()))
    }

    /// Suspend claiming and scheduling for a tenant.
    #[instrument(skip(self), err)]
    pub async fn pause(&self, tenant_id: &str, username: &str) -> DomainResult<MaintenanceControl> {
        self.ensure_tenant(tenant_id).await?;
        loop {
            let mut control = self
                .maintenance
                .get_by_tenant(tenant_id)
                .await?
                .ok_or_else(|| DomainError::TenantNotFound(tenant_id.to_string()))?;

            if control.is_paused {
                return Ok(control);
            }
            control.pause(username);

            match self.maintenance.update(&control).await {
                Ok(()) => {
                    info!(tenant_id, username, "Tenant paused");
                    return self.get(tenant_id).await;
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Resume claiming and scheduling for a tenant.
    #[instrument(skip(self), err)]
    pub async fn resume(&self, tenant_id: &str) -> DomainResult<MaintenanceControl> {
        loop {
            let mut control = self
                .maintenance
                .get_by_tenant(tenant_id)
                .await?
                .ok_or_else(|| DomainError::TenantNotFound(tenant_id.to_string()))?;

            if !control.is_paused {
                return Ok(control);
            }
            control.resume();

            match self.maintenance.update(&control).await {
                Ok(()) => {
                    info!(tenant_id, "Tenant resumed");
                    return self.get(tenant_id).await;
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, tenant_id: &str) -> DomainResult<MaintenanceControl> {
        self.maintenance
            .get_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| DomainError::TenantNotFound(tenant_id.to_string()))
    }

    pub async fn list(&self) -> DomainResult<Vec<MaintenanceControl>> {
        self.maintenance.list().await
    }

    pub async fn paused_tenants(&self) -> DomainResult<Vec<String>> {
        self.maintenance.list_paused_tenants().await
    }

    /// Try to take ownership of a tenant's maintenance sweep. Returns the
    /// claimed row, or None when the sweep is not due or another worker
    /// holds it.
    pub async fn try_claim_sweep(
        &self,
        control: &MaintenanceControl,
        processor_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<MaintenanceControl>> {
        if !control.is_sweep_due(now) {
            return Ok(None);
        }
        self.maintenance.claim_sweep(control, processor_id).await
    }

    /// Release a held sweep and advance the heartbeat.
    pub async fn finish_sweep(
        &self,
        control: &MaintenanceControl,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> DomainResult<()> {
        self.maintenance
            .complete_sweep(control, now, now + interval)
            .await
    }
}
