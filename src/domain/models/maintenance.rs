//! Maintenance control domain model.
//!
//! One row per tenant: the pause/resume gate read by the claim loop and the
//! scheduler, plus the heartbeat of the periodic maintenance sweep and the
//! worker that owns it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-tenant processing gate and maintenance-sweep heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceControl {
    /// Store-assigned identifier (0 until inserted)
    pub id: i64,
    /// External globally-unique identity
    pub code: Uuid,
    /// Optimistic-concurrency token; sweep claiming is a CAS on it
    pub row_version: i64,
    /// The tenant this row gates
    pub tenant_id: String,
    /// While true, no claims and no schedule firings for this tenant
    pub is_paused: bool,
    /// Audit: who paused
    pub paused_by: Option<String>,
    /// Audit: when paused
    pub paused_at: Option<DateTime<Utc>>,
    /// A worker currently owns the maintenance sweep
    pub sweep_started: bool,
    /// The last sweep finished
    pub sweep_completed: bool,
    /// Owner of the in-flight sweep
    pub sweep_processor_id: Option<String>,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub next_sweep_at: Option<DateTime<Utc>>,
}

impl MaintenanceControl {
    /// Create the control row for a tenant, unpaused, sweep immediately due.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            code: Uuid::new_v4(),
            row_version: 1,
            tenant_id: tenant_id.into(),
            is_paused: false,
            paused_by: None,
            paused_at: None,
            sweep_started: false,
            sweep_completed: true,
            sweep_processor_id: None,
            last_sweep_at: None,
            next_sweep_at: Some(Utc::now()),
        }
    }

    /// Suspend claiming and scheduling for the tenant.
    pub fn pause(&mut self, username: impl Into<String>) {
        self.is_paused = true;
        self.paused_by = Some(username.into());
        self.paused_at = Some(Utc::now());
    }

    /// Resume claiming and scheduling for the tenant.
    pub fn resume(&mut self) {
        self.is_paused = false;
        self.paused_by = None;
        self.paused_at = None;
    }

    /// Whether a worker may claim the maintenance sweep at `now`.
    pub fn is_sweep_due(&self, now: DateTime<Utc>) -> bool {
        !self.sweep_started && self.next_sweep_at.is_some_and(|at| at <= now)
    }

    /// Take ownership of the sweep.
    pub fn begin_sweep(&mut self, processor_id: impl Into<String>) {
        self.sweep_started = true;
        self.sweep_completed = false;
        self.sweep_processor_id = Some(processor_id.into());
    }

    /// Release the sweep and advance the heartbeat.
    pub fn complete_sweep(&mut self, now: DateTime<Utc>, interval: Duration) {
        self.sweep_started = false;
        self.sweep_completed = true;
        self.sweep_processor_id = None;
        self.last_sweep_at = Some(now);
        self.next_sweep_at = Some(now + interval);
    }
}
