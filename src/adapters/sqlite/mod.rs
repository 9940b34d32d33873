//! SQLite adapters: the shipped implementation of every persistence port.

pub mod connection;
pub mod maintenance_repository;
pub mod migrations;
pub mod schedule_repository;
pub mod task_repository;
pub mod workflow_repository;

pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use maintenance_repository::SqliteMaintenanceRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use schedule_repository::SqliteScheduleRepository;
pub use task_repository::SqliteTaskRepository;
pub use workflow_repository::SqliteWorkflowRepository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

pub(crate) fn parse_uuid(value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| DomainError::ValidationFailed(format!("Invalid UUID '{value}': {e}")))
}

pub(crate) fn parse_timestamp(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::ValidationFailed(format!("Invalid timestamp '{value}': {e}")))
}

pub(crate) fn parse_opt_timestamp(value: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}
