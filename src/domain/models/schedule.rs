//! Recurring schedule domain model.
//!
//! A schedule is the per-tenant, per-workflow-type definition of a recurring
//! trigger: every `frequency_hours`, a new root workflow of the configured
//! type is created.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring trigger definition for one tenant and workflow type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,
    /// External globally-unique identity
    pub code: Uuid,
    /// Optimistic-concurrency token; firing is guarded by a CAS on it
    pub row_version: i64,
    /// Tenant whose workflows this schedule creates
    pub tenant_id: String,
    /// Workflow type created on each firing
    pub flow_type: String,
    /// Firing interval
    pub frequency_hours: i64,
    /// Inactive schedules are skipped by the scheduler pass
    pub is_active: bool,
    /// When the schedule last fired
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Next due time; advanced from the firing time, not the old value
    pub next_fire_at: DateTime<Utc>,
}

impl RecurringSchedule {
    /// Create a new active schedule due `frequency_hours` from now.
    pub fn new(
        tenant_id: impl Into<String>,
        flow_type: impl Into<String>,
        frequency_hours: i64,
    ) -> Self {
        Self {
            id: 0,
            code: Uuid::new_v4(),
            row_version: 1,
            tenant_id: tenant_id.into(),
            flow_type: flow_type.into(),
            frequency_hours,
            is_active: true,
            last_fired_at: None,
            next_fire_at: Utc::now() + Duration::hours(frequency_hours),
        }
    }

    /// Whether the schedule should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_fire_at <= now
    }

    /// Advance the firing bookkeeping after a successful firing.
    ///
    /// `next_fire_at` moves exactly one interval from `now` so a schedule
    /// that was overdue does not accumulate drift or fire repeatedly.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_fired_at = Some(now);
        self.next_fire_at = now + Duration::hours(self.frequency_hours);
    }
}
