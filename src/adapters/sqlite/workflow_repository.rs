//! SQLite implementation of the WorkflowRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{WorkflowInstance, WorkflowStatus};
use crate::domain::ports::{WorkflowFilter, WorkflowRepository};

use super::{parse_opt_timestamp, parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: SqlitePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkflowRow {
    id: i64,
    code: String,
    row_version: i64,
    flow_type: String,
    tenant_id: String,
    subject_code: String,
    parent_workflow_id: Option<i64>,
    root_workflow_id: i64,
    dependency_workflow_id: Option<i64>,
    priority_level: i64,
    status: String,
    cancel_requested: i64,
    is_resubmitted: i64,
    is_paused: i64,
    build_task_debug: i64,
    run_task_debug: i64,
    result_value: String,
    min_start_at: String,
    requested_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<WorkflowRow> for WorkflowInstance {
    type Error = DomainError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let status = WorkflowStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::ValidationFailed(format!("Unknown workflow status '{}'", row.status))
        })?;

        Ok(WorkflowInstance {
            id: row.id,
            code: parse_uuid(&row.code)?,
            row_version: row.row_version,
            flow_type: row.flow_type,
            tenant_id: row.tenant_id,
            subject_code: parse_uuid(&row.subject_code)?,
            parent_workflow_id: row.parent_workflow_id,
            root_workflow_id: row.root_workflow_id,
            dependency_workflow_id: row.dependency_workflow_id,
            priority_level: row.priority_level as i32,
            status,
            cancel_requested: row.cancel_requested != 0,
            is_resubmitted: row.is_resubmitted != 0,
            is_paused: row.is_paused != 0,
            build_task_debug: row.build_task_debug != 0,
            run_task_debug: row.run_task_debug != 0,
            result_value: row.result_value,
            min_start_at: parse_timestamp(&row.min_start_at)?,
            requested_at: parse_timestamp(&row.requested_at)?,
            started_at: parse_opt_timestamp(row.started_at.as_deref())?,
            completed_at: parse_opt_timestamp(row.completed_at.as_deref())?,
        })
    }
}

const TERMINAL_STATUSES: &str = "'succeeded', 'canceled'";

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn insert(&self, workflow: &WorkflowInstance) -> DomainResult<i64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"INSERT INTO workflows (code, row_version, flow_type, tenant_id, subject_code,
               parent_workflow_id, root_workflow_id, dependency_workflow_id, priority_level,
               status, cancel_requested, is_resubmitted, is_paused, build_task_debug,
               run_task_debug, result_value, min_start_at, requested_at, started_at, completed_at)
               VALUES (?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.code.to_string())
        .bind(&workflow.flow_type)
        .bind(&workflow.tenant_id)
        .bind(workflow.subject_code.to_string())
        .bind(workflow.parent_workflow_id)
        .bind(workflow.root_workflow_id)
        .bind(workflow.dependency_workflow_id)
        .bind(i64::from(workflow.priority_level))
        .bind(workflow.status.as_str())
        .bind(i64::from(workflow.cancel_requested))
        .bind(i64::from(workflow.is_resubmitted))
        .bind(i64::from(workflow.is_paused))
        .bind(i64::from(workflow.build_task_debug))
        .bind(i64::from(workflow.run_task_debug))
        .bind(&workflow.result_value)
        .bind(workflow.min_start_at.to_rfc3339())
        .bind(workflow.requested_at.to_rfc3339())
        .bind(workflow.started_at.map(|t| t.to_rfc3339()))
        .bind(workflow.completed_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        // A root workflow is its own top-most ancestor
        if workflow.root_workflow_id == 0 {
            sqlx::query("UPDATE workflows SET root_workflow_id = ? WHERE id = ?")
                .bind(id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> DomainResult<Option<WorkflowInstance>> {
        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<WorkflowInstance>> {
        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE code = ?")
            .bind(code.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, workflow: &WorkflowInstance) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE workflows SET
               row_version = row_version + 1,
               priority_level = ?, status = ?, cancel_requested = ?, is_resubmitted = ?,
               is_paused = ?, result_value = ?, min_start_at = ?, started_at = ?, completed_at = ?
               WHERE id = ? AND row_version = ?"#,
        )
        .bind(i64::from(workflow.priority_level))
        .bind(workflow.status.as_str())
        .bind(i64::from(workflow.cancel_requested))
        .bind(i64::from(workflow.is_resubmitted))
        .bind(i64::from(workflow.is_paused))
        .bind(&workflow.result_value)
        .bind(workflow.min_start_at.to_rfc3339())
        .bind(workflow.started_at.map(|t| t.to_rfc3339()))
        .bind(workflow.completed_at.map(|t| t.to_rfc3339()))
        .bind(workflow.id)
        .bind(workflow.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM workflows WHERE id = ?")
                .bind(workflow.id)
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DomainError::Conflict { entity: "workflow", id: workflow.id }),
                None => Err(DomainError::WorkflowNotFound(workflow.id)),
            };
        }

        Ok(())
    }

    async fn list(&self, filter: WorkflowFilter) -> DomainResult<Vec<WorkflowInstance>> {
        let mut query = String::from("SELECT * FROM workflows WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            query.push_str(" AND tenant_id = ?");
            bindings.push(tenant_id.clone());
        }
        if let Some(flow_type) = &filter.flow_type {
            query.push_str(" AND flow_type = ?");
            bindings.push(flow_type.clone());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(root_id) = filter.root_workflow_id {
            query.push_str(" AND root_workflow_id = ?");
            bindings.push(root_id.to_string());
        }
        if let Some(parent_id) = filter.parent_workflow_id {
            query.push_str(" AND parent_workflow_id = ?");
            bindings.push(parent_id.to_string());
        }
        if let Some(cancel_requested) = filter.cancel_requested {
            query.push_str(" AND cancel_requested = ?");
            bindings.push(i64::from(cancel_requested).to_string());
        }

        query.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, WorkflowRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        if let Some(limit) = filter.limit {
            q = q.bind(limit);
        }

        let rows: Vec<WorkflowRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, filter: WorkflowFilter) -> DomainResult<i64> {
        let mut query = String::from("SELECT COUNT(*) FROM workflows WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            query.push_str(" AND tenant_id = ?");
            bindings.push(tenant_id.clone());
        }
        if let Some(flow_type) = &filter.flow_type {
            query.push_str(" AND flow_type = ?");
            bindings.push(flow_type.clone());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn list_expandable(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<WorkflowInstance>> {
        let mut query = format!(
            r#"SELECT * FROM workflows w
               WHERE w.status IN ('requested', 'expanding_tasks')
               AND w.cancel_requested = 0
               AND w.is_paused = 0
               AND w.min_start_at <= ?
               AND (w.dependency_workflow_id IS NULL OR EXISTS (
                   SELECT 1 FROM workflows d
                   WHERE d.id = w.dependency_workflow_id AND d.status IN ({TERMINAL_STATUSES})))"#
        );

        if !paused_tenants.is_empty() {
            let placeholders = vec!["?"; paused_tenants.len()].join(", ");
            query.push_str(&format!(" AND w.tenant_id NOT IN ({placeholders})"));
        }
        query.push_str(" ORDER BY w.priority_level DESC, w.min_start_at ASC, w.id ASC LIMIT ?");

        let mut q = sqlx::query_as::<_, WorkflowRow>(&query).bind(now.to_rfc3339());
        for tenant in paused_tenants {
            q = q.bind(tenant);
        }
        q = q.bind(limit);

        let rows: Vec<WorkflowRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_active_for_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> DomainResult<Vec<WorkflowInstance>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"SELECT * FROM workflows
               WHERE tenant_id = ? AND status IN ('tasks_created', 'started')
               ORDER BY id ASC LIMIT ?"#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
