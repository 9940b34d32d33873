//! Recurring scheduler loop.
//!
//! Thin time-keeping shell around `ScheduleService::run_pass`; safe to run
//! on every worker process concurrently because firing is CAS-guarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::services::ScheduleService;

pub struct Scheduler {
    service: Arc<ScheduleService>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        service: Arc<ScheduleService>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { service, poll_interval, shutdown }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self) {
        info!("Scheduler started");
        let mut shutdown = self.shutdown.clone();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.service.run_pass(Utc::now()).await {
                        Ok(fired) if fired > 0 => debug!(fired, "Scheduler pass fired workflows"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Scheduler pass failed"),
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}
