//! SQLite implementation of the TaskRepository.
//!
//! The claim operation is the engine's concurrency primitive: a single
//! UPDATE guarded by the version token, the eligible status, and the
//! sibling parallel-run exclusion, so exactly one worker wins a race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskDependency, TaskInstance, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::{parse_opt_timestamp, parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    code: String,
    row_version: i64,
    workflow_id: i64,
    task_type: String,
    subject_code: String,
    priority_level: i64,
    predecessor_task_id: Option<i64>,
    status: String,
    cancel_requested: i64,
    parallel_allowed: i64,
    retry_count: i64,
    max_retry_count: i64,
    processor_id: Option<String>,
    run_task_debug: i64,
    param_1: String,
    param_2: String,
    result_value: String,
    min_start_at: String,
    requested_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for TaskInstance {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::ValidationFailed(format!("Unknown task status '{}'", row.status))
        })?;

        Ok(TaskInstance {
            id: row.id,
            code: parse_uuid(&row.code)?,
            row_version: row.row_version,
            workflow_id: row.workflow_id,
            task_type: row.task_type,
            subject_code: parse_uuid(&row.subject_code)?,
            priority_level: row.priority_level as i32,
            predecessor_task_id: row.predecessor_task_id,
            status,
            cancel_requested: row.cancel_requested != 0,
            parallel_allowed: row.parallel_allowed != 0,
            retry_count: row.retry_count as u32,
            max_retry_count: row.max_retry_count as u32,
            processor_id: row.processor_id,
            run_task_debug: row.run_task_debug != 0,
            param_1: row.param_1,
            param_2: row.param_2,
            result_value: row.result_value,
            min_start_at: parse_timestamp(&row.min_start_at)?,
            requested_at: parse_timestamp(&row.requested_at)?,
            started_at: parse_opt_timestamp(row.started_at.as_deref())?,
            completed_at: parse_opt_timestamp(row.completed_at.as_deref())?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DependencyRow {
    id: i64,
    workflow_id: i64,
    task_id: i64,
    predecessor_task_id: Option<i64>,
    predecessor_ref: Option<String>,
    placeholder: i64,
}

impl From<DependencyRow> for TaskDependency {
    fn from(row: DependencyRow) -> Self {
        TaskDependency {
            id: row.id,
            workflow_id: row.workflow_id,
            task_id: row.task_id,
            predecessor_task_id: row.predecessor_task_id,
            predecessor_ref: row.predecessor_ref,
            placeholder: row.placeholder != 0,
        }
    }
}

async fn insert_task_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &TaskInstance,
) -> DomainResult<i64> {
    let result = sqlx::query(
        r#"INSERT INTO tasks (code, row_version, workflow_id, task_type, subject_code,
           priority_level, predecessor_task_id, status, cancel_requested, parallel_allowed,
           retry_count, max_retry_count, processor_id, run_task_debug, param_1, param_2,
           result_value, min_start_at, requested_at, started_at, completed_at)
           VALUES (?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(task.code.to_string())
    .bind(task.workflow_id)
    .bind(&task.task_type)
    .bind(task.subject_code.to_string())
    .bind(i64::from(task.priority_level))
    .bind(task.predecessor_task_id)
    .bind(task.status.as_str())
    .bind(i64::from(task.cancel_requested))
    .bind(i64::from(task.parallel_allowed))
    .bind(i64::from(task.retry_count))
    .bind(i64::from(task.max_retry_count))
    .bind(&task.processor_id)
    .bind(i64::from(task.run_task_debug))
    .bind(&task.param_1)
    .bind(&task.param_2)
    .bind(&task.result_value)
    .bind(task.min_start_at.to_rfc3339())
    .bind(task.requested_at.to_rfc3339())
    .bind(task.started_at.map(|t| t.to_rfc3339()))
    .bind(task.completed_at.map(|t| t.to_rfc3339()))
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &TaskInstance) -> DomainResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_task_tx(&mut tx, task).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn insert_bulk(&self, tasks: &[TaskInstance]) -> DomainResult<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(insert_task_tx(&mut tx, task).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn get(&self, id: i64) -> DomainResult<Option<TaskInstance>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<TaskInstance>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE code = ?")
            .bind(code.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, task: &TaskInstance) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE tasks SET
               row_version = row_version + 1,
               status = ?, cancel_requested = ?, retry_count = ?, processor_id = ?,
               result_value = ?, min_start_at = ?, started_at = ?, completed_at = ?
               WHERE id = ? AND row_version = ?"#,
        )
        .bind(task.status.as_str())
        .bind(i64::from(task.cancel_requested))
        .bind(i64::from(task.retry_count))
        .bind(&task.processor_id)
        .bind(&task.result_value)
        .bind(task.min_start_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.id)
        .bind(task.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
                .bind(task.id)
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DomainError::Conflict { entity: "task", id: task.id }),
                None => Err(DomainError::TaskNotFound(task.id)),
            };
        }

        Ok(())
    }

    async fn update_bulk(&self, tasks: &[TaskInstance]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            let result = sqlx::query(
                r#"UPDATE tasks SET
                   row_version = row_version + 1,
                   status = ?, cancel_requested = ?, retry_count = ?, processor_id = ?,
                   result_value = ?, min_start_at = ?, started_at = ?, completed_at = ?
                   WHERE id = ? AND row_version = ?"#,
            )
            .bind(task.status.as_str())
            .bind(i64::from(task.cancel_requested))
            .bind(i64::from(task.retry_count))
            .bind(&task.processor_id)
            .bind(&task.result_value)
            .bind(task.min_start_at.to_rfc3339())
            .bind(task.started_at.map(|t| t.to_rfc3339()))
            .bind(task.completed_at.map(|t| t.to_rfc3339()))
            .bind(task.id)
            .bind(task.row_version)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(DomainError::Conflict { entity: "task", id: task.id });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<TaskInstance>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(workflow_id) = filter.workflow_id {
            query.push_str(" AND workflow_id = ?");
            bindings.push(workflow_id.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(processor_id) = &filter.processor_id {
            query.push_str(" AND processor_id = ?");
            bindings.push(processor_id.clone());
        }

        query.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        if let Some(limit) = filter.limit {
            q = q.bind(limit);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, filter: TaskFilter) -> DomainResult<i64> {
        let mut query = String::from("SELECT COUNT(*) FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(workflow_id) = filter.workflow_id {
            query.push_str(" AND workflow_id = ?");
            bindings.push(workflow_id.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(processor_id) = &filter.processor_id {
            query.push_str(" AND processor_id = ?");
            bindings.push(processor_id.clone());
        }

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn list_by_workflow(&self, workflow_id: i64) -> DomainResult<Vec<TaskInstance>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE workflow_id = ? ORDER BY id ASC")
                .bind(workflow_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_predecessor(
        &self,
        predecessor_task_id: i64,
    ) -> DomainResult<Vec<TaskInstance>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT DISTINCT t.* FROM tasks t
               LEFT JOIN task_dependencies d ON d.task_id = t.id AND d.placeholder = 0
               WHERE t.predecessor_task_id = ? OR d.predecessor_task_id = ?
               ORDER BY t.id ASC"#,
        )
        .bind(predecessor_task_id)
        .bind(predecessor_task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_claim_candidates(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<TaskInstance>> {
        let mut query = String::from(
            r#"SELECT t.* FROM tasks t
               JOIN workflows w ON w.id = t.workflow_id
               WHERE t.status = 'eligible'
               AND t.cancel_requested = 0
               AND t.min_start_at <= ?
               AND w.is_paused = 0"#,
        );

        if !paused_tenants.is_empty() {
            let placeholders = vec!["?"; paused_tenants.len()].join(", ");
            query.push_str(&format!(" AND w.tenant_id NOT IN ({placeholders})"));
        }
        query.push_str(" ORDER BY t.priority_level DESC, t.min_start_at ASC, t.id ASC LIMIT ?");

        let mut q = sqlx::query_as::<_, TaskRow>(&query).bind(now.to_rfc3339());
        for tenant in paused_tenants {
            q = q.bind(tenant);
        }
        q = q.bind(limit);

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim(
        &self,
        task: &TaskInstance,
        processor_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<TaskInstance>> {
        // The sibling subquery enforces the parallel-run exclusion both
        // ways: a non-parallel candidate cannot start while any sibling
        // runs, and no candidate can start while a non-parallel sibling
        // runs.
        let result = sqlx::query(
            r#"UPDATE tasks SET
               row_version = row_version + 1,
               status = 'running', processor_id = ?, started_at = ?
               WHERE id = ? AND row_version = ?
               AND status = 'eligible'
               AND cancel_requested = 0
               AND min_start_at <= ?
               AND NOT EXISTS (
                   SELECT 1 FROM tasks s
                   WHERE s.workflow_id = tasks.workflow_id
                   AND s.id <> tasks.id
                   AND s.status = 'running'
                   AND (s.parallel_allowed = 0 OR ? = 0))"#,
        )
        .bind(processor_id)
        .bind(now.to_rfc3339())
        .bind(task.id)
        .bind(task.row_version)
        .bind(now.to_rfc3339())
        .bind(i64::from(task.parallel_allowed))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(task.id).await
    }

    async fn list_stale_running(
        &self,
        tenant_id: &str,
        older_than: DateTime<Utc>,
    ) -> DomainResult<Vec<TaskInstance>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT t.* FROM tasks t
               JOIN workflows w ON w.id = t.workflow_id
               WHERE w.tenant_id = ?
               AND t.status = 'running'
               AND t.started_at IS NOT NULL
               AND t.started_at < ?
               ORDER BY t.started_at ASC"#,
        )
        .bind(tenant_id)
        .bind(older_than.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_dependencies(&self, edges: &[TaskDependency]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for edge in edges {
            sqlx::query(
                r#"INSERT INTO task_dependencies
                   (workflow_id, task_id, predecessor_task_id, predecessor_ref, placeholder)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(edge.workflow_id)
            .bind(edge.task_id)
            .bind(edge.predecessor_task_id)
            .bind(&edge.predecessor_ref)
            .bind(i64::from(edge.placeholder))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_dependencies(&self, workflow_id: i64) -> DomainResult<Vec<TaskDependency>> {
        let rows: Vec<DependencyRow> = sqlx::query_as(
            "SELECT * FROM task_dependencies WHERE workflow_id = ? ORDER BY id ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn resolve_placeholders(
        &self,
        workflow_id: i64,
        mapping: &[(String, i64)],
    ) -> DomainResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut resolved = 0usize;
        for (task_type, predecessor_id) in mapping {
            let result = sqlx::query(
                r#"UPDATE task_dependencies
                   SET predecessor_task_id = ?, placeholder = 0
                   WHERE workflow_id = ? AND placeholder = 1 AND predecessor_ref = ?"#,
            )
            .bind(predecessor_id)
            .bind(workflow_id)
            .bind(task_type)
            .execute(&mut *tx)
            .await?;
            resolved += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(resolved)
    }
}
