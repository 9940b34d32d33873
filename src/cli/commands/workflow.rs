//! Workflow CLI commands: submit, show, list, cancel, resubmit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets, ContentArrangement, Table};
use uuid::Uuid;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{TaskInstance, WorkflowInstance, WorkflowStatus};
use crate::domain::ports::WorkflowFilter;
use crate::services::SubmitWorkflow;

use super::init_engine;

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub command: WorkflowCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Submit a new workflow
    Submit {
        /// Workflow type (must exist in the configured flow types)
        #[arg(long)]
        flow_type: String,

        /// Owning tenant
        #[arg(long)]
        tenant: String,

        /// Subject the workflow acts upon (random UUID when omitted)
        #[arg(long)]
        subject: Option<Uuid>,

        /// Priority level (higher claims first)
        #[arg(long, default_value_t = 0)]
        priority: i32,

        /// Workflow code this one must wait for
        #[arg(long)]
        after: Option<Uuid>,
    },

    /// Show a workflow and its tasks
    Show {
        /// Workflow code
        code: Uuid,
    },

    /// List workflows
    List {
        /// Filter by tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Filter by status
        #[arg(long)]
        status: Option<String>,

        /// Maximum rows
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Request cooperative cancellation of a workflow
    Cancel {
        /// Workflow code
        code: Uuid,
    },

    /// Clone a terminal workflow into a fresh request
    Resubmit {
        /// Workflow code
        code: Uuid,
    },
}

// -- Output structs --

#[derive(Debug, serde::Serialize)]
pub struct WorkflowOutput {
    pub id: i64,
    pub code: String,
    pub flow_type: String,
    pub tenant_id: String,
    pub subject_code: String,
    pub status: String,
    pub priority_level: i32,
    pub cancel_requested: bool,
    pub result_value: String,
    pub requested_at: String,
    pub completed_at: Option<String>,
}

impl From<&WorkflowInstance> for WorkflowOutput {
    fn from(wf: &WorkflowInstance) -> Self {
        Self {
            id: wf.id,
            code: wf.code.to_string(),
            flow_type: wf.flow_type.clone(),
            tenant_id: wf.tenant_id.clone(),
            subject_code: wf.subject_code.to_string(),
            status: wf.status.as_str().to_string(),
            priority_level: wf.priority_level,
            cancel_requested: wf.cancel_requested,
            result_value: wf.result_value.clone(),
            requested_at: wf.requested_at.to_rfc3339(),
            completed_at: wf.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl CommandOutput for WorkflowOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Workflow {} ({})", self.code, self.flow_type),
            format!("  status:   {}", self.status),
            format!("  tenant:   {}", self.tenant_id),
            format!("  subject:  {}", self.subject_code),
            format!("  priority: {}", self.priority_level),
        ];
        if self.cancel_requested {
            lines.push("  cancel requested".to_string());
        }
        if !self.result_value.is_empty() {
            lines.push(format!("  result:   {}", truncate(&self.result_value, 80)));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct WorkflowDetailOutput {
    pub workflow: WorkflowOutput,
    pub tasks: Vec<TaskOutputRow>,
}

#[derive(Debug, serde::Serialize)]
pub struct TaskOutputRow {
    pub id: i64,
    pub task_type: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retry_count: u32,
    pub processor_id: Option<String>,
    pub result_value: String,
}

impl From<&TaskInstance> for TaskOutputRow {
    fn from(task: &TaskInstance) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type.clone(),
            status: task.status.as_str().to_string(),
            retry_count: task.retry_count,
            max_retry_count: task.max_retry_count,
            processor_id: task.processor_id.clone(),
            result_value: task.result_value.clone(),
        }
    }
}

impl CommandOutput for WorkflowDetailOutput {
    fn to_human(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["ID", "Task", "Status", "Retries", "Worker", "Result"]);

        for task in &self.tasks {
            table.add_row(vec![
                task.id.to_string(),
                task.task_type.clone(),
                task.status.clone(),
                format!("{}/{}", task.retry_count, task.max_retry_count),
                task.processor_id.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&task.result_value, 30),
            ]);
        }

        format!("{}\n\n{table}", self.workflow.to_human())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct WorkflowListOutput {
    pub workflows: Vec<WorkflowOutput>,
    pub total: usize,
}

impl CommandOutput for WorkflowListOutput {
    fn to_human(&self) -> String {
        if self.workflows.is_empty() {
            return "No workflows found.".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["ID", "Code", "Type", "Tenant", "Status", "Requested"]);

        for wf in &self.workflows {
            table.add_row(vec![
                wf.id.to_string(),
                truncate(&wf.code, 11),
                wf.flow_type.clone(),
                wf.tenant_id.clone(),
                wf.status.clone(),
                wf.requested_at.clone(),
            ]);
        }

        format!("Found {} workflow(s):\n{table}", self.total)
    }
}

pub async fn execute(args: WorkflowArgs, config: Option<&PathBuf>, json: bool) -> Result<()> {
    let (_config, engine) = init_engine(config).await?;

    match args.command {
        WorkflowCommands::Submit { flow_type, tenant, subject, priority, after } => {
            let mut request = SubmitWorkflow::new(
                flow_type,
                tenant,
                subject.unwrap_or_else(Uuid::new_v4),
            );
            request.priority_level = priority;
            if let Some(after_code) = after {
                let dependency = engine
                    .workflows
                    .get_by_code(after_code)
                    .await?
                    .with_context(|| format!("No workflow with code {after_code}"))?;
                request.dependency_workflow_id = Some(dependency.id);
            }

            let workflow = engine.workflow_service.submit(request).await?;
            output(&WorkflowOutput::from(&workflow), json);
        }

        WorkflowCommands::Show { code } => {
            let (workflow, tasks) = engine
                .workflow_service
                .status_by_code(code)
                .await?
                .with_context(|| format!("No workflow with code {code}"))?;

            let detail = WorkflowDetailOutput {
                workflow: WorkflowOutput::from(&workflow),
                tasks: tasks.iter().map(TaskOutputRow::from).collect(),
            };
            output(&detail, json);
        }

        WorkflowCommands::List { tenant, status, limit } => {
            let status = status
                .map(|s| {
                    WorkflowStatus::from_str(&s)
                        .with_context(|| format!("Unknown workflow status '{s}'"))
                })
                .transpose()?;

            let workflows = engine
                .workflows
                .list(WorkflowFilter {
                    tenant_id: tenant,
                    status,
                    limit: Some(limit),
                    ..WorkflowFilter::default()
                })
                .await?;

            let list = WorkflowListOutput {
                total: workflows.len(),
                workflows: workflows.iter().map(WorkflowOutput::from).collect(),
            };
            output(&list, json);
        }

        WorkflowCommands::Cancel { code } => {
            let workflow = engine
                .workflows
                .get_by_code(code)
                .await?
                .with_context(|| format!("No workflow with code {code}"))?;

            engine.workflow_service.request_cancel(workflow.id).await?;
            let workflow = engine
                .workflows
                .get(workflow.id)
                .await?
                .with_context(|| format!("No workflow with code {code}"))?;
            output(&WorkflowOutput::from(&workflow), json);
        }

        WorkflowCommands::Resubmit { code } => {
            let workflow = engine
                .workflows
                .get_by_code(code)
                .await?
                .with_context(|| format!("No workflow with code {code}"))?;

            let clone = engine.workflow_service.resubmit(workflow.id).await?;
            output(&WorkflowOutput::from(&clone), json);
        }
    }

    Ok(())
}
