//! Schedule CLI commands for managing recurring workflow triggers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::RecurringSchedule;
use crate::domain::ports::ScheduleFilter;

use super::init_engine;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleCommands,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Create a new recurring schedule
    Create {
        /// Tenant the created workflows belong to
        #[arg(long)]
        tenant: String,

        /// Workflow type to create on each firing
        #[arg(long)]
        flow_type: String,

        /// Firing interval in hours
        #[arg(long)]
        every_hours: i64,
    },

    /// List schedules
    List {
        /// Filter by tenant
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Enable a schedule
    Enable {
        /// Schedule code
        code: Uuid,
    },

    /// Disable a schedule
    Disable {
        /// Schedule code
        code: Uuid,
    },

    /// Delete a schedule
    Delete {
        /// Schedule code
        code: Uuid,
    },
}

// -- Output structs --

#[derive(Debug, serde::Serialize)]
pub struct ScheduleOutput {
    pub id: i64,
    pub code: String,
    pub tenant_id: String,
    pub flow_type: String,
    pub frequency_hours: i64,
    pub is_active: bool,
    pub last_fired_at: Option<String>,
    pub next_fire_at: String,
}

impl From<&RecurringSchedule> for ScheduleOutput {
    fn from(s: &RecurringSchedule) -> Self {
        Self {
            id: s.id,
            code: s.code.to_string(),
            tenant_id: s.tenant_id.clone(),
            flow_type: s.flow_type.clone(),
            frequency_hours: s.frequency_hours,
            is_active: s.is_active,
            last_fired_at: s.last_fired_at.map(|t| t.to_rfc3339()),
            next_fire_at: s.next_fire_at.to_rfc3339(),
        }
    }
}

impl CommandOutput for ScheduleOutput {
    fn to_human(&self) -> String {
        format!(
            "Schedule {} — every {}h, {} ({} / {})\n  last: {}\n  next: {}",
            self.code,
            self.frequency_hours,
            if self.is_active { "active" } else { "disabled" },
            self.tenant_id,
            self.flow_type,
            self.last_fired_at.as_deref().unwrap_or("never"),
            self.next_fire_at,
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ScheduleListOutput {
    pub schedules: Vec<ScheduleOutput>,
    pub total: usize,
}

impl CommandOutput for ScheduleListOutput {
    fn to_human(&self) -> String {
        if self.schedules.is_empty() {
            return "No schedules found.".to_string();
        }

        let mut lines = vec![format!("Found {} schedule(s):\n", self.total)];
        lines.push(format!(
            "{:<6} {:<14} {:<12} {:<20} {:<8} {:<25}",
            "ID", "TENANT", "EVERY", "FLOW TYPE", "ACTIVE", "NEXT FIRE"
        ));
        lines.push("-".repeat(88));

        for s in &self.schedules {
            lines.push(format!(
                "{:<6} {:<14} {:<12} {:<20} {:<8} {:<25}",
                s.id,
                s.tenant_id,
                format!("{}h", s.frequency_hours),
                s.flow_type,
                s.is_active,
                s.next_fire_at,
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ScheduleArgs, config: Option<&PathBuf>, json: bool) -> Result<()> {
    let (_config, engine) = init_engine(config).await?;

    match args.command {
        ScheduleCommands::Create { tenant, flow_type, every_hours } => {
            let schedule = engine
                .schedule_service
                .create(&tenant, &flow_type, every_hours)
                .await?;
            output(&ScheduleOutput::from(&schedule), json);
        }

        ScheduleCommands::List { tenant } => {
            let schedules = engine
                .schedule_service
                .list(ScheduleFilter { tenant_id: tenant, ..ScheduleFilter::default() })
                .await?;
            let list = ScheduleListOutput {
                total: schedules.len(),
                schedules: schedules.iter().map(ScheduleOutput::from).collect(),
            };
            output(&list, json);
        }

        ScheduleCommands::Enable { code } => {
            let schedule = resolve(&engine, code).await?;
            let schedule = engine.schedule_service.set_active(schedule.id, true).await?;
            output(&ScheduleOutput::from(&schedule), json);
        }

        ScheduleCommands::Disable { code } => {
            let schedule = resolve(&engine, code).await?;
            let schedule = engine.schedule_service.set_active(schedule.id, false).await?;
            output(&ScheduleOutput::from(&schedule), json);
        }

        ScheduleCommands::Delete { code } => {
            let schedule = resolve(&engine, code).await?;
            engine.schedule_service.delete(schedule.id).await?;
            if !json {
                println!("Schedule {code} deleted.");
            }
        }
    }

    Ok(())
}

async fn resolve(
    engine: &crate::infrastructure::Engine,
    code: Uuid,
) -> Result<RecurringSchedule> {
    engine
        .schedules
        .get_by_code(code)
        .await?
        .with_context(|| format!("No schedule with code {code}"))
}
