//! Tenant CLI commands: pause/resume processing and show maintenance state.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::MaintenanceControl;

use super::init_engine;

#[derive(Args, Debug)]
pub struct TenantArgs {
    #[command(subcommand)]
    pub command: TenantCommands,
}

#[derive(Subcommand, Debug)]
pub enum TenantCommands {
    /// Suspend claiming and scheduling for a tenant
    Pause {
        /// Tenant to pause
        tenant: String,

        /// Who is pausing (recorded in the audit fields)
        #[arg(long, default_value = "cli")]
        by: String,
    },

    /// Resume claiming and scheduling for a tenant
    Resume {
        /// Tenant to resume
        tenant: String,
    },

    /// Show maintenance state for all tenants
    Status,
}

// -- Output structs --

#[derive(Debug, serde::Serialize)]
pub struct TenantOutput {
    pub tenant_id: String,
    pub is_paused: bool,
    pub paused_by: Option<String>,
    pub paused_at: Option<String>,
    pub sweep_started: bool,
    pub sweep_processor_id: Option<String>,
    pub last_sweep_at: Option<String>,
    pub next_sweep_at: Option<String>,
}

impl From<&MaintenanceControl> for TenantOutput {
    fn from(control: &MaintenanceControl) -> Self {
        Self {
            tenant_id: control.tenant_id.clone(),
            is_paused: control.is_paused,
            paused_by: control.paused_by.clone(),
            paused_at: control.paused_at.map(|t| t.to_rfc3339()),
            sweep_started: control.sweep_started,
            sweep_processor_id: control.sweep_processor_id.clone(),
            last_sweep_at: control.last_sweep_at.map(|t| t.to_rfc3339()),
            next_sweep_at: control.next_sweep_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl CommandOutput for TenantOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Tenant {} — {}",
            self.tenant_id,
            if self.is_paused { "PAUSED" } else { "active" }
        )];
        if let (Some(by), Some(at)) = (&self.paused_by, &self.paused_at) {
            lines.push(format!("  paused by {by} at {at}"));
        }
        if self.sweep_started {
            lines.push(format!(
                "  sweep in flight, owned by {}",
                self.sweep_processor_id.as_deref().unwrap_or("unknown")
            ));
        }
        if let Some(last) = &self.last_sweep_at {
            lines.push(format!("  last sweep: {last}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TenantListOutput {
    pub tenants: Vec<TenantOutput>,
}

impl CommandOutput for TenantListOutput {
    fn to_human(&self) -> String {
        if self.tenants.is_empty() {
            return "No tenants known yet.".to_string();
        }
        self.tenants
            .iter()
            .map(CommandOutput::to_human)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn execute(args: TenantArgs, config: Option<&PathBuf>, json: bool) -> Result<()> {
    let (_config, engine) = init_engine(config).await?;

    match args.command {
        TenantCommands::Pause { tenant, by } => {
            let control = engine.maintenance_service.pause(&tenant, &by).await?;
            output(&TenantOutput::from(&control), json);
        }

        TenantCommands::Resume { tenant } => {
            let control = engine.maintenance_service.resume(&tenant).await?;
            output(&TenantOutput::from(&control), json);
        }

        TenantCommands::Status => {
            let controls = engine.maintenance_service.list().await?;
            let list = TenantListOutput {
                tenants: controls.iter().map(TenantOutput::from).collect(),
            };
            output(&list, json);
        }
    }

    Ok(())
}
