//! Workflow lifecycle service.
//!
//! Owns submission, the idempotent task-creation expansion, the resolver
//! pass that keeps task eligibility and cancellation current, completion
//! detection, and resubmission of terminal workflows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FlowTypeRegistry, MaintenanceControl, TaskDependency, TaskInstance, TaskStatus,
    WorkflowInstance, WorkflowStatus,
};
use crate::domain::ports::{MaintenanceRepository, TaskRepository, WorkflowRepository};
use crate::services::DependencyResolver;

/// Request to create a new workflow.
#[derive(Debug, Clone)]
pub struct SubmitWorkflow {
    pub flow_type: String,
    pub tenant_id: String,
    pub subject_code: Uuid,
    pub priority_level: i32,
    pub min_start_at: Option<DateTime<Utc>>,
    pub parent_workflow_id: Option<i64>,
    pub dependency_workflow_id: Option<i64>,
    pub build_task_debug: bool,
    pub run_task_debug: bool,
}

impl SubmitWorkflow {
    pub fn new(
        flow_type: impl Into<String>,
        tenant_id: impl Into<String>,
        subject_code: Uuid,
    ) -> Self {
        Self {
            flow_type: flow_type.into(),
            tenant_id: tenant_id.into(),
            subject_code,
            priority_level: 0,
            min_start_at: None,
            parent_workflow_id: None,
            dependency_workflow_id: None,
            build_task_debug: false,
            run_task_debug: false,
        }
    }
}

pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    tasks: Arc<dyn TaskRepository>,
    maintenance: Arc<dyn MaintenanceRepository>,
    registry: Arc<FlowTypeRegistry>,
    resolver: DependencyResolver,
}

impl WorkflowService {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        tasks: Arc<dyn TaskRepository>,
        maintenance: Arc<dyn MaintenanceRepository>,
        registry: Arc<FlowTypeRegistry>,
    ) -> Self {
        Self {
            workflows,
            tasks,
            maintenance,
            registry,
            resolver: DependencyResolver::new(),
        }
    }

    /// Submit a new workflow request.
    #[instrument(skip(self, request), fields(flow_type = %request.flow_type, tenant = %request.tenant_id), err)]
    pub async fn submit(&self, request: SubmitWorkflow) -> DomainResult<WorkflowInstance> {
        if self.registry.get(&request.flow_type).is_none() {
            return Err(DomainError::UnknownFlowType(request.flow_type));
        }

        let mut workflow =
            WorkflowInstance::new(request.flow_type, request.tenant_id, request.subject_code)
                .with_priority(request.priority_level);

        if let Some(min_start_at) = request.min_start_at {
            workflow = workflow.with_min_start(min_start_at);
        }
        if let Some(parent_id) = request.parent_workflow_id {
            let parent = self
                .workflows
                .get(parent_id)
                .await?
                .ok_or(DomainError::WorkflowNotFound(parent_id))?;
            workflow = workflow.with_parent(parent_id, parent.root_workflow_id);
        }
        if let Some(dependency_id) = request.dependency_workflow_id {
            workflow = workflow.with_dependency(dependency_id);
        }
        workflow.build_task_debug = request.build_task_debug;
        workflow.run_task_debug = request.run_task_debug;

        self.ensure_tenant_control(&workflow.tenant_id).await?;

        let id = self.workflows.insert(&workflow).await?;
        let workflow = self
            .workflows
            .get(id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(id))?;

        info!(workflow_id = id, code = %workflow.code, "Workflow submitted");
        Ok(workflow)
    }

    /// Workflow plus its tasks, looked up by external code.
    pub async fn status_by_code(
        &self,
        code: Uuid,
    ) -> DomainResult<Option<(WorkflowInstance, Vec<TaskInstance>)>> {
        let Some(workflow) = self.workflows.get_by_code(code).await? else {
            return Ok(None);
        };
        let tasks = self.tasks.list_by_workflow(workflow.id).await?;
        Ok(Some((workflow, tasks)))
    }

    /// Expand a workflow into its task set.
    ///
    /// Idempotent and resumable: `ExpandingTasks` marks intent,
    /// `TasksCreated` marks completion, existing rows are never duplicated,
    /// and a crash mid-expansion is retried on the next pass. Returns the
    /// number of tasks created by this call.
    #[instrument(skip(self), err)]
    pub async fn expand(&self, workflow_id: i64) -> DomainResult<usize> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;

        if workflow.is_tasks_created() || workflow.is_terminal() {
            return Ok(0);
        }

        if workflow.cancel_requested {
            self.finalize_unexpanded_cancel(workflow_id).await?;
            return Ok(0);
        }

        if let Some(dependency_id) = workflow.dependency_workflow_id {
            match self.workflows.get(dependency_id).await? {
                Some(dependency) if !dependency.is_terminal() => {
                    debug!(workflow_id, dependency_id, "Dependency workflow not terminal yet");
                    return Ok(0);
                }
                Some(_) => {}
                None => {
                    self.fail_workflow(
                        workflow_id,
                        format!("dependency workflow {dependency_id} does not exist"),
                    )
                    .await?;
                    return Ok(0);
                }
            }
        }

        let Some(flow) = self.registry.get(&workflow.flow_type).cloned() else {
            self.fail_workflow(
                workflow_id,
                format!("unknown flow type '{}'", workflow.flow_type),
            )
            .await?;
            return Ok(0);
        };

        // Mark intent. Losing this race means another worker is expanding;
        // leave the workflow to it.
        if workflow.status == WorkflowStatus::Requested {
            let started = self
                .mutate_workflow(workflow_id, |wf| {
                    wf.status == WorkflowStatus::Requested
                        && wf.transition_to(WorkflowStatus::ExpandingTasks).is_ok()
                })
                .await?;
            if !started {
                return Ok(0);
            }
        }

        // Phase 1: materialize missing task rows in template order, each
        // followed by its dependency edges. A single predecessor that
        // already exists rides inline on the task row; everything else
        // becomes a join edge, as a placeholder when it names a template
        // that has not been inserted yet.
        let existing = self.tasks.list_by_workflow(workflow_id).await?;
        let mut ids_by_type: HashMap<String, i64> = existing
            .iter()
            .map(|t| (t.task_type.clone(), t.id))
            .collect();
        let resumed_ids: HashSet<i64> = existing.iter().map(|t| t.id).collect();
        let mut created = 0usize;

        for template in &flow.tasks {
            if ids_by_type.contains_key(&template.task_type) {
                continue;
            }

            let mut task = TaskInstance::new(workflow_id, &template.task_type, workflow.subject_code)
                .with_priority(workflow.priority_level)
                .with_params(&template.param_1, &template.param_2)
                .with_retry_budget(template.max_retry_count)
                .with_parallel_allowed(template.parallel_allowed)
                .with_min_start(
                    workflow.min_start_at + Duration::seconds(template.start_delay_secs as i64),
                );
            task.run_task_debug = workflow.run_task_debug;

            if let [single_dep] = template.depends_on.as_slice() {
                if let Some(&pred_id) = ids_by_type.get(single_dep) {
                    task.predecessor_task_id = Some(pred_id);
                }
            }
            let has_inline = task.predecessor_task_id.is_some();

            let task_id = self.tasks.insert(&task).await?;
            ids_by_type.insert(template.task_type.clone(), task_id);
            created += 1;

            if !has_inline && !template.depends_on.is_empty() {
                let edges: Vec<TaskDependency> = template
                    .depends_on
                    .iter()
                    .map(|dep_name| match ids_by_type.get(dep_name) {
                        Some(&pred_id) => TaskDependency::new(workflow_id, task_id, pred_id),
                        None => TaskDependency::placeholder(workflow_id, task_id, dep_name),
                    })
                    .collect();
                self.tasks.insert_dependencies(&edges).await?;
            }
        }

        // Phase 2: repair pass for a resumed expansion — a task row written
        // before a crash may be missing its edges.
        if !resumed_ids.is_empty() {
            let existing_edges = self.tasks.list_dependencies(workflow_id).await?;
            let tasks_with_edges: HashSet<i64> =
                existing_edges.iter().map(|e| e.task_id).collect();
            let inline_by_id: HashMap<i64, Option<i64>> = existing
                .iter()
                .map(|t| (t.id, t.predecessor_task_id))
                .collect();

            let mut repair_edges: Vec<TaskDependency> = Vec::new();
            for template in &flow.tasks {
                if template.depends_on.is_empty() {
                    continue;
                }
                let Some(&task_id) = ids_by_type.get(&template.task_type) else {
                    continue;
                };
                if !resumed_ids.contains(&task_id)
                    || tasks_with_edges.contains(&task_id)
                    || inline_by_id.get(&task_id).copied().flatten().is_some()
                {
                    continue;
                }

                for dep_name in &template.depends_on {
                    match ids_by_type.get(dep_name) {
                        Some(&pred_id) => {
                            repair_edges.push(TaskDependency::new(workflow_id, task_id, pred_id));
                        }
                        None => {
                            repair_edges
                                .push(TaskDependency::placeholder(workflow_id, task_id, dep_name));
                        }
                    }
                }
            }
            if !repair_edges.is_empty() {
                self.tasks.insert_dependencies(&repair_edges).await?;
            }
        }

        // Phase 3: every task row now exists, so placeholders resolve
        let mapping: Vec<(String, i64)> = ids_by_type.into_iter().collect();
        self.tasks.resolve_placeholders(workflow_id, &mapping).await?;

        // Phase 4: guard against a malformed graph before opening the gate
        let tasks_final = self.tasks.list_by_workflow(workflow_id).await?;
        let edges_final = self.tasks.list_dependencies(workflow_id).await?;
        if let Some(cycle) = self.resolver.detect_cycle(&tasks_final, &edges_final) {
            let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            self.fail_workflow(
                workflow_id,
                format!("dependency cycle detected: {}", path.join(" -> ")),
            )
            .await?;
            return Err(DomainError::DependencyCycle(path));
        }

        self.mutate_workflow(workflow_id, |wf| {
            wf.status == WorkflowStatus::ExpandingTasks
                && wf.transition_to(WorkflowStatus::TasksCreated).is_ok()
        })
        .await?;

        info!(workflow_id, created, "Workflow expanded into task set");

        // First resolver pass opens the initial eligible frontier
        self.refresh(workflow_id).await?;
        Ok(created)
    }

    /// One resolver pass over a workflow: propagate cancellation (requested
    /// and cancel-on-failure), promote eligible tasks, maintain the Started
    /// marker, and detect completion.
    #[instrument(skip(self), err)]
    pub async fn refresh(&self, workflow_id: i64) -> DomainResult<()> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;

        if workflow.is_terminal() {
            return Ok(());
        }

        if !workflow.is_tasks_created() {
            if workflow.cancel_requested {
                self.finalize_unexpanded_cancel(workflow_id).await?;
            }
            return Ok(());
        }

        let edges = self.tasks.list_dependencies(workflow_id).await?;
        let mut tasks = self.tasks.list_by_workflow(workflow_id).await?;

        // Workflow-level cancel request fans out to non-terminal tasks
        if workflow.cancel_requested {
            for task in &tasks {
                if !task.is_terminal() && !task.cancel_requested {
                    self.mutate_task(task.id, |t| {
                        if t.is_terminal() || t.cancel_requested {
                            return false;
                        }
                        t.cancel_requested = true;
                        true
                    })
                    .await?;
                }
            }
            tasks = self.tasks.list_by_workflow(workflow_id).await?;
        }

        // Cancel requests on tasks that are not mid-attempt finalize now
        for task in &tasks {
            if task.cancel_requested && !task.is_terminal() && task.status != TaskStatus::Running {
                self.mutate_task(task.id, |t| {
                    if t.is_terminal() || t.status == TaskStatus::Running {
                        return false;
                    }
                    t.cancel_requested = true;
                    t.transition_to(TaskStatus::Canceled).is_ok()
                })
                .await?;
            }
        }
        tasks = self.tasks.list_by_workflow(workflow_id).await?;

        // Cancel-on-failure: dependents of canceled/exhausted predecessors
        let targets = self.resolver.cancel_targets(&tasks, &edges);
        if !targets.is_empty() {
            debug!(workflow_id, count = targets.len(), "Propagating cancellation to dependents");
        }
        for task_id in targets {
            self.mutate_task(task_id, |t| {
                if t.is_terminal() {
                    return false;
                }
                t.cancel_requested = true;
                if t.status != TaskStatus::Running {
                    let _ = t.transition_to(TaskStatus::Canceled);
                }
                true
            })
            .await?;
        }
        tasks = self.tasks.list_by_workflow(workflow_id).await?;

        // Promote the eligible frontier
        let eligible_ids: Vec<i64> = self
            .resolver
            .eligible_tasks(&tasks, &edges)
            .iter()
            .map(|t| t.id)
            .collect();
        for task_id in eligible_ids {
            self.mutate_task(task_id, |t| {
                t.status == TaskStatus::Pending
                    && !t.cancel_requested
                    && t.transition_to(TaskStatus::Eligible).is_ok()
            })
            .await?;
        }
        tasks = self.tasks.list_by_workflow(workflow_id).await?;

        // Started marker
        if workflow.status == WorkflowStatus::TasksCreated
            && tasks.iter().any(TaskInstance::is_started)
        {
            self.mutate_workflow(workflow_id, |wf| {
                wf.status == WorkflowStatus::TasksCreated
                    && wf.transition_to(WorkflowStatus::Started).is_ok()
            })
            .await?;
        }

        // Completion: all owned tasks terminal. An empty task set (flow
        // type with no templates) completes successfully on the spot.
        if tasks.iter().all(TaskInstance::is_terminal) {
            let successful = tasks.iter().all(TaskInstance::is_successful);
            let target = if successful {
                WorkflowStatus::Succeeded
            } else {
                WorkflowStatus::Canceled
            };
            let completed = self
                .mutate_workflow(workflow_id, |wf| {
                    !wf.is_terminal() && wf.transition_to(target).is_ok()
                })
                .await?;
            if completed {
                info!(
                    workflow_id,
                    successful, "Workflow completed"
                );
            }
        }

        Ok(())
    }

    /// Request cooperative cancellation of a workflow and everything it owns.
    #[instrument(skip(self), err)]
    pub async fn request_cancel(&self, workflow_id: i64) -> DomainResult<()> {
        self.mutate_workflow(workflow_id, |wf| {
            if wf.is_terminal() || wf.cancel_requested {
                return false;
            }
            wf.cancel_requested = true;
            true
        })
        .await?;

        self.refresh(workflow_id).await
    }

    /// Clone a terminal workflow into a fresh request sharing its root
    /// lineage, marking the original as resubmitted.
    #[instrument(skip(self), err)]
    pub async fn resubmit(&self, workflow_id: i64) -> DomainResult<WorkflowInstance> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;

        let clone = workflow.clone_for_resubmit().map_err(|reason| {
            DomainError::InvalidStateTransition {
                from: workflow.status.as_str().to_string(),
                to: WorkflowStatus::Requested.as_str().to_string(),
                reason,
            }
        })?;

        let clone_id = self.workflows.insert(&clone).await?;

        self.mutate_workflow(workflow_id, |wf| {
            if wf.is_resubmitted {
                return false;
            }
            wf.is_resubmitted = true;
            true
        })
        .await?;

        let clone = self
            .workflows
            .get(clone_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(clone_id))?;

        info!(workflow_id, clone_id, "Workflow resubmitted");
        Ok(clone)
    }

    /// Cancel a workflow and record a diagnostic in its result value.
    /// Invariant violations are fatal to this workflow only.
    pub async fn fail_workflow(
        &self,
        workflow_id: i64,
        diagnostic: String,
    ) -> DomainResult<()> {
        warn!(workflow_id, %diagnostic, "Failing workflow");
        self.mutate_workflow(workflow_id, |wf| {
            if wf.is_terminal() {
                return false;
            }
            wf.cancel_requested = true;
            wf.result_value = diagnostic.clone();
            let _ = wf.transition_to(WorkflowStatus::Canceled);
            true
        })
        .await?;

        // Tasks may already exist; fan the cancellation out to them
        let tasks = self.tasks.list_by_workflow(workflow_id).await?;
        for task in &tasks {
            if !task.is_terminal() {
                self.mutate_task(task.id, |t| {
                    if t.is_terminal() {
                        return false;
                    }
                    t.cancel_requested = true;
                    if t.status != TaskStatus::Running {
                        let _ = t.transition_to(TaskStatus::Canceled);
                    }
                    true
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn finalize_unexpanded_cancel(&self, workflow_id: i64) -> DomainResult<()> {
        self.mutate_workflow(workflow_id, |wf| {
            !wf.is_terminal() && wf.transition_to(WorkflowStatus::Canceled).is_ok()
        })
        .await?;
        Ok(())
    }

    async fn ensure_tenant_control(&self, tenant_id: &str) -> DomainResult<()> {
        if self.maintenance.get_by_tenant(tenant_id).await?.is_some() {
            return Ok(());
        }
        let control = MaintenanceControl::new(tenant_id);
        // A concurrent insert for the same tenant loses on the unique
        // constraint; the row existing is all that matters.
        if let Err(e) = self.maintenance.insert(&control).await {
            if self.maintenance.get_by_tenant(tenant_id).await?.is_none() {
                return Err(e);
            }
        }
        Ok(())
    }

    /// Read-mutate-update loop for a workflow row. The closure returns
    /// false to signal a no-op. Returns whether an update was written.
    async fn mutate_workflow<F>(&self, workflow_id: i64, mutate: F) -> DomainResult<bool>
    where
        F: Fn(&mut WorkflowInstance) -> bool + Send + Sync,
    {
        loop {
            let mut workflow = self
                .workflows
                .get(workflow_id)
                .await?
                .ok_or(DomainError::WorkflowNotFound(workflow_id))?;

            if !mutate(&mut workflow) {
                return Ok(false);
            }

            match self.workflows.update(&workflow).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read-mutate-update loop for a task row.
    async fn mutate_task<F>(&self, task_id: i64, mutate: F) -> DomainResult<bool>
    where
        F: Fn(&mut TaskInstance) -> bool + Send + Sync,
    {
        loop {
            let mut task = self
                .tasks
                .get(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;

            if !mutate(&mut task) {
                return Ok(false);
            }

            match self.tasks.update(&task).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
