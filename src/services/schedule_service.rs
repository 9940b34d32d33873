//! Recurring scheduler service.
//!
//! Each pass fires every active schedule whose due time has arrived for a
//! tenant that is not paused. Firing advances the schedule's bookkeeping
//! and creates the root workflow in one atomic unit guarded by the
//! schedule's version token, so concurrent workers never double-fire.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FlowTypeRegistry, MaintenanceControl, RecurringSchedule, WorkflowInstance,
};
use crate::domain::ports::{MaintenanceRepository, ScheduleFilter, ScheduleRepository};

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleRepository>,
    maintenance: Arc<dyn MaintenanceRepository>,
    registry: Arc<FlowTypeRegistry>,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        maintenance: Arc<dyn MaintenanceRepository>,
        registry: Arc<FlowTypeRegistry>,
    ) -> Self {
        Self { schedules, maintenance, registry }
    }

    /// Create a new recurring schedule definition.
    #[instrument(skip(self), err)]
    pub async fn create(
        &self,
        tenant_id: &str,
        flow_type: &str,
        frequency_hours: i64,
    ) -> DomainResult<RecurringSchedule> {
        if frequency_hours < 1 {
            return Err(DomainError::ValidationFailed(format!(
                "frequency_hours must be at least 1, got {frequency_hours}"
            )));
        }
        if self.registry.get(flow_type).is_none() {
            return Err(DomainError::UnknownFlowType(flow_type.to_string()));
        }

        if self.maintenance.get_by_tenant(tenant_id).await?.is_none() {
            let control = MaintenanceControl::new(tenant_id);
            if let Err(e) = self.maintenance.insert(&control).await {
                if self.maintenance.get_by_tenant(tenant_id).await?.is_none() {
                    return Err(e);
                }
            }
        }

        let schedule = RecurringSchedule::new(tenant_id, flow_type, frequency_hours);
        let id = self.schedules.insert(&schedule).await?;
        let schedule = self
            .schedules
            .get(id)
            .await?
            .ok_or(DomainError::ScheduleNotFound(id))?;

        info!(schedule_id = id, tenant_id, flow_type, frequency_hours, "Schedule created");
        Ok(schedule)
    }

    pub async fn get(&self, id: i64) -> DomainResult<Option<RecurringSchedule>> {
        self.schedules.get(id).await
    }

    pub async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<RecurringSchedule>> {
        self.schedules.list(filter).await
    }

    /// Enable or disable a schedule.
    #[instrument(skip(self), err)]
    pub async fn set_active(&self, id: i64, is_active: bool) -> DomainResult<RecurringSchedule> {
        loop {
            let mut schedule = self
                .schedules
                .get(id)
                .await?
                .ok_or(DomainError::ScheduleNotFound(id))?;

            if schedule.is_active == is_active {
                return Ok(schedule);
            }
            schedule.is_active = is_active;

            match self.schedules.update(&schedule).await {
                Ok(()) => {
                    return self
                        .schedules
                        .get(id)
                        .await?
                        .ok_or(DomainError::ScheduleNotFound(id));
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete a schedule definition.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: i64) -> DomainResult<()> {
        self.schedules.delete(id).await?;
        info!(schedule_id = id, "Schedule deleted");
        Ok(())
    }

    /// One scheduler pass: fire everything due at `now`. Returns the number
    /// of workflows created by this worker (lost races don't count).
    #[instrument(skip(self), err)]
    pub async fn run_pass(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let paused = self.maintenance.list_paused_tenants().await?;
        let due = self.schedules.list_due(&paused, now).await?;

        let mut fired = 0usize;
        for schedule in due {
            if self.registry.get(&schedule.flow_type).is_none() {
                warn!(
                    schedule_id = schedule.id,
                    flow_type = %schedule.flow_type,
                    "Schedule references unknown flow type; skipping"
                );
                continue;
            }

            // Each firing acts on a fresh subject
            let workflow = WorkflowInstance::new(
                schedule.flow_type.clone(),
                schedule.tenant_id.clone(),
                Uuid::new_v4(),
            );

            match self.schedules.fire(&schedule, now, &workflow).await? {
                Some(workflow_id) => {
                    info!(
                        schedule_id = schedule.id,
                        workflow_id,
                        tenant = %schedule.tenant_id,
                        flow_type = %schedule.flow_type,
                        "Schedule fired"
                    );
                    fired += 1;
                }
                None => {
                    debug!(schedule_id = schedule.id, "Lost firing race to another worker");
                }
            }
        }

        Ok(fired)
    }
}
