//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::schedule::ScheduleArgs;
pub use commands::tenant::TenantArgs;
pub use commands::worker::WorkerArgs;
pub use commands::workflow::WorkflowArgs;

#[derive(Parser, Debug)]
#[command(name = "dynaflow", version, about = "DAG workflow orchestration engine")]
pub struct Cli {
    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a config file (defaults to the .dynaflow/ hierarchy)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the claim/dispatch worker (and scheduler)
    Worker(WorkerArgs),
    /// Submit and inspect workflows
    Workflow(WorkflowArgs),
    /// Manage recurring schedules
    Schedule(ScheduleArgs),
    /// Pause/resume tenants and inspect maintenance state
    Tenant(TenantArgs),
}

/// Report a command failure in the selected output mode and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) {
    if json {
        let payload = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{payload}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
