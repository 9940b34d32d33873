//! SQLite implementation of the ScheduleRepository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RecurringSchedule, WorkflowInstance};
use crate::domain::ports::{ScheduleFilter, ScheduleRepository};

use super::{parse_opt_timestamp, parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: i64,
    code: String,
    row_version: i64,
    tenant_id: String,
    flow_type: String,
    frequency_hours: i64,
    is_active: i64,
    last_fired_at: Option<String>,
    next_fire_at: String,
}

impl TryFrom<ScheduleRow> for RecurringSchedule {
    type Error = DomainError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(RecurringSchedule {
            id: row.id,
            code: parse_uuid(&row.code)?,
            row_version: row.row_version,
            tenant_id: row.tenant_id,
            flow_type: row.flow_type,
            frequency_hours: row.frequency_hours,
            is_active: row.is_active != 0,
            last_fired_at: parse_opt_timestamp(row.last_fired_at.as_deref())?,
            next_fire_at: parse_timestamp(&row.next_fire_at)?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn insert(&self, schedule: &RecurringSchedule) -> DomainResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO schedules (code, row_version, tenant_id, flow_type,
               frequency_hours, is_active, last_fired_at, next_fire_at)
               VALUES (?, 1, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(schedule.code.to_string())
        .bind(&schedule.tenant_id)
        .bind(&schedule.flow_type)
        .bind(schedule.frequency_hours)
        .bind(i64::from(schedule.is_active))
        .bind(schedule.last_fired_at.map(|t| t.to_rfc3339()))
        .bind(schedule.next_fire_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> DomainResult<Option<RecurringSchedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM schedules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_code(&self, code: Uuid) -> DomainResult<Option<RecurringSchedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM schedules WHERE code = ?")
            .bind(code.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, schedule: &RecurringSchedule) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE schedules SET
               row_version = row_version + 1,
               frequency_hours = ?, is_active = ?, last_fired_at = ?, next_fire_at = ?
               WHERE id = ? AND row_version = ?"#,
        )
        .bind(schedule.frequency_hours)
        .bind(i64::from(schedule.is_active))
        .bind(schedule.last_fired_at.map(|t| t.to_rfc3339()))
        .bind(schedule.next_fire_at.to_rfc3339())
        .bind(schedule.id)
        .bind(schedule.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM schedules WHERE id = ?")
                .bind(schedule.id)
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DomainError::Conflict { entity: "schedule", id: schedule.id }),
                None => Err(DomainError::ScheduleNotFound(schedule.id)),
            };
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ScheduleNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<RecurringSchedule>> {
        let mut query = String::from("SELECT * FROM schedules WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            query.push_str(" AND tenant_id = ?");
            bindings.push(tenant_id.clone());
        }
        if let Some(flow_type) = &filter.flow_type {
            query.push_str(" AND flow_type = ?");
            bindings.push(flow_type.clone());
        }
        if let Some(is_active) = filter.is_active {
            query.push_str(" AND is_active = ?");
            bindings.push(i64::from(is_active).to_string());
        }

        query.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, ScheduleRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        if let Some(limit) = filter.limit {
            q = q.bind(limit);
        }

        let rows: Vec<ScheduleRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_due(
        &self,
        paused_tenants: &[String],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<RecurringSchedule>> {
        let mut query =
            String::from("SELECT * FROM schedules WHERE is_active = 1 AND next_fire_at <= ?");

        if !paused_tenants.is_empty() {
            let placeholders = vec!["?"; paused_tenants.len()].join(", ");
            query.push_str(&format!(" AND tenant_id NOT IN ({placeholders})"));
        }
        query.push_str(" ORDER BY next_fire_at ASC, id ASC");

        let mut q = sqlx::query_as::<_, ScheduleRow>(&query).bind(now.to_rfc3339());
        for tenant in paused_tenants {
            q = q.bind(tenant);
        }

        let rows: Vec<ScheduleRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn fire(
        &self,
        schedule: &RecurringSchedule,
        now: DateTime<Utc>,
        workflow: &WorkflowInstance,
    ) -> DomainResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        // Advancing the bookkeeping is the firing claim: the version guard
        // lets exactly one worker per due interval through.
        let next_fire_at = now + Duration::hours(schedule.frequency_hours);
        let advanced = sqlx::query(
            r#"UPDATE schedules SET
               row_version = row_version + 1,
               last_fired_at = ?, next_fire_at = ?
               WHERE id = ? AND row_version = ? AND is_active = 1"#,
        )
        .bind(now.to_rfc3339())
        .bind(next_fire_at.to_rfc3339())
        .bind(schedule.id)
        .bind(schedule.row_version)
        .execute(&mut *tx)
        .await?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let result = sqlx::query(
            r#"INSERT INTO workflows (code, row_version, flow_type, tenant_id, subject_code,
               parent_workflow_id, root_workflow_id, dependency_workflow_id, priority_level,
               status, cancel_requested, is_resubmitted, is_paused, build_task_debug,
               run_task_debug, result_value, min_start_at, requested_at, started_at, completed_at)
               VALUES (?, 1, ?, ?, ?, NULL, 0, NULL, ?, ?, 0, 0, 0, 0, 0, '', ?, ?, NULL, NULL)"#,
        )
        .bind(workflow.code.to_string())
        .bind(&workflow.flow_type)
        .bind(&workflow.tenant_id)
        .bind(workflow.subject_code.to_string())
        .bind(i64::from(workflow.priority_level))
        .bind(workflow.status.as_str())
        .bind(workflow.min_start_at.to_rfc3339())
        .bind(workflow.requested_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let workflow_id = result.last_insert_rowid();

        sqlx::query("UPDATE workflows SET root_workflow_id = ? WHERE id = ?")
            .bind(workflow_id)
            .bind(workflow_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(workflow_id))
    }
}
