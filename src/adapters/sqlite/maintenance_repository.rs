//! SQLite implementation of the MaintenanceRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MaintenanceControl;
use crate::domain::ports::MaintenanceRepository;

use super::{parse_opt_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteMaintenanceRepository {
    pool: SqlitePool,
}

impl SqliteMaintenanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MaintenanceRow {
    id: i64,
    code: String,
    row_version: i64,
    tenant_id: String,
    is_paused: i64,
    paused_by: Option<String>,
    paused_at: Option<String>,
    sweep_started: i64,
    sweep_completed: i64,
    sweep_processor_id: Option<String>,
    last_sweep_at: Option<String>,
    next_sweep_at: Option<String>,
}

impl TryFrom<MaintenanceRow> for MaintenanceControl {
    type Error = DomainError;

    fn try_from(row: MaintenanceRow) -> Result<Self, Self::Error> {
        Ok(MaintenanceControl {
            id: row.id,
            code: parse_uuid(&row.code)?,
            row_version: row.row_version,
            tenant_id: row.tenant_id,
            is_paused: row.is_paused != 0,
            paused_by: row.paused_by,
            paused_at: parse_opt_timestamp(row.paused_at.as_deref())?,
            sweep_started: row.sweep_started != 0,
            sweep_completed: row.sweep_completed != 0,
            sweep_processor_id: row.sweep_processor_id,
            last_sweep_at: parse_opt_timestamp(row.last_sweep_at.as_deref())?,
            next_sweep_at: parse_opt_timestamp(row.next_sweep_at.as_deref())?,
        })
    }
}

#[async_trait]
impl MaintenanceRepository for SqliteMaintenanceRepository {
    async fn insert(&self, control: &MaintenanceControl) -> DomainResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO maintenance (code, row_version, tenant_id, is_paused, paused_by,
               paused_at, sweep_started, sweep_completed, sweep_processor_id,
               last_sweep_at, next_sweep_at)
               VALUES (?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(control.code.to_string())
        .bind(&control.tenant_id)
        .bind(i64::from(control.is_paused))
        .bind(&control.paused_by)
        .bind(control.paused_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(control.sweep_started))
        .bind(i64::from(control.sweep_completed))
        .bind(&control.sweep_processor_id)
        .bind(control.last_sweep_at.map(|t| t.to_rfc3339()))
        .bind(control.next_sweep_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_by_tenant(&self, tenant_id: &str) -> DomainResult<Option<MaintenanceControl>> {
        let row: Option<MaintenanceRow> =
            sqlx::query_as("SELECT * FROM maintenance WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<MaintenanceControl>> {
        let rows: Vec<MaintenanceRow> =
            sqlx::query_as("SELECT * FROM maintenance ORDER BY tenant_id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_paused_tenants(&self) -> DomainResult<Vec<String>> {
        let tenants: Vec<(String,)> =
            sqlx::query_as("SELECT tenant_id FROM maintenance WHERE is_paused = 1")
                .fetch_all(&self.pool)
                .await?;

        Ok(tenants.into_iter().map(|(t,)| t).collect())
    }

    async fn update(&self, control: &MaintenanceControl) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE maintenance SET
               row_version = row_version + 1,
               is_paused = ?, paused_by = ?, paused_at = ?,
               sweep_started = ?, sweep_completed = ?, sweep_processor_id = ?,
               last_sweep_at = ?, next_sweep_at = ?
               WHERE id = ? AND row_version = ?"#,
        )
        .bind(i64::from(control.is_paused))
        .bind(&control.paused_by)
        .bind(control.paused_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(control.sweep_started))
        .bind(i64::from(control.sweep_completed))
        .bind(&control.sweep_processor_id)
        .bind(control.last_sweep_at.map(|t| t.to_rfc3339()))
        .bind(control.next_sweep_at.map(|t| t.to_rfc3339()))
        .bind(control.id)
        .bind(control.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM maintenance WHERE id = ?")
                .bind(control.id)
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DomainError::Conflict { entity: "maintenance", id: control.id }),
                None => Err(DomainError::TenantNotFound(control.tenant_id.clone())),
            };
        }

        Ok(())
    }

    async fn claim_sweep(
        &self,
        control: &MaintenanceControl,
        processor_id: &str,
    ) -> DomainResult<Option<MaintenanceControl>> {
        let result = sqlx::query(
            r#"UPDATE maintenance SET
               row_version = row_version + 1,
               sweep_started = 1, sweep_completed = 0, sweep_processor_id = ?
               WHERE id = ? AND row_version = ? AND sweep_started = 0"#,
        )
        .bind(processor_id)
        .bind(control.id)
        .bind(control.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_tenant(&control.tenant_id).await
    }

    async fn complete_sweep(
        &self,
        control: &MaintenanceControl,
        now: DateTime<Utc>,
        next_sweep_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE maintenance SET
               row_version = row_version + 1,
               sweep_started = 0, sweep_completed = 1, sweep_processor_id = NULL,
               last_sweep_at = ?, next_sweep_at = ?
               WHERE id = ? AND sweep_processor_id = ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(next_sweep_at.to_rfc3339())
        .bind(control.id)
        .bind(&control.sweep_processor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
