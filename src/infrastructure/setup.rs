//! Engine wiring: pool, migrations, repositories, and services from a
//! loaded configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteMaintenanceRepository,
    SqliteScheduleRepository, SqliteTaskRepository, SqliteWorkflowRepository,
};
use crate::domain::models::{Config, FlowTypeRegistry};
use crate::domain::ports::{
    MaintenanceRepository, ScheduleRepository, TaskRepository, WorkflowRepository,
};
use crate::services::{
    MaintenanceService, ScheduleService, TaskLifecycleService, WorkflowService,
};

/// Everything a command or loop needs, wired once.
pub struct Engine {
    pub pool: SqlitePool,
    pub registry: Arc<FlowTypeRegistry>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub maintenance: Arc<dyn MaintenanceRepository>,
    pub workflow_service: Arc<WorkflowService>,
    pub task_lifecycle: Arc<TaskLifecycleService>,
    pub schedule_service: Arc<ScheduleService>,
    pub maintenance_service: Arc<MaintenanceService>,
}

impl Engine {
    /// Open the database, run migrations, and wire all services.
    pub async fn init(config: &Config) -> Result<Self> {
        let database_url = format!("sqlite:{}", config.database.path);
        let pool = create_pool(
            &database_url,
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..PoolConfig::default()
            }),
        )
        .await
        .context("Failed to create database pool")?;

        Self::from_pool(pool, config).await
    }

    /// Wire services over an existing pool (tests use in-memory pools).
    pub async fn from_pool(pool: SqlitePool, config: &Config) -> Result<Self> {
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .context("Failed to run migrations")?;

        let registry = Arc::new(
            FlowTypeRegistry::new(config.flow_types.clone())
                .map_err(|e| anyhow::anyhow!("Invalid flow types: {e}"))?,
        );

        let workflows: Arc<dyn WorkflowRepository> =
            Arc::new(SqliteWorkflowRepository::new(pool.clone()));
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let schedules: Arc<dyn ScheduleRepository> =
            Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let maintenance: Arc<dyn MaintenanceRepository> =
            Arc::new(SqliteMaintenanceRepository::new(pool.clone()));

        let workflow_service = Arc::new(WorkflowService::new(
            Arc::clone(&workflows),
            Arc::clone(&tasks),
            Arc::clone(&maintenance),
            Arc::clone(&registry),
        ));
        let task_lifecycle = Arc::new(TaskLifecycleService::new(Arc::clone(&tasks)));
        let schedule_service = Arc::new(ScheduleService::new(
            Arc::clone(&schedules),
            Arc::clone(&maintenance),
            Arc::clone(&registry),
        ));
        let maintenance_service = Arc::new(MaintenanceService::new(Arc::clone(&maintenance)));

        Ok(Self {
            pool,
            registry,
            workflows,
            tasks,
            schedules,
            maintenance,
            workflow_service,
            task_lifecycle,
            schedule_service,
            maintenance_service,
        })
    }
}

/// Stable-enough worker identity when none is configured.
pub fn default_processor_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}-{}", std::process::id())
}
