//! Domain errors for the orchestration engine.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `a -> b -> c -> a`.
fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Domain-level errors.
///
/// `Conflict` is the optimistic-concurrency signal: the row changed since it
/// was read. Callers re-read and retry or abandon the candidate; it is never
/// fatal to a worker loop.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(i64),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(i64),

    #[error("No record with code {0}")]
    CodeNotFound(Uuid),

    #[error("No maintenance record for tenant {0}")]
    TenantNotFound(String),

    #[error("Stale version on {entity} {id}: row was modified concurrently")]
    Conflict { entity: &'static str, id: i64 },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<String>),

    #[error("Unknown flow type: {0}")]
    UnknownFlowType(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether the error is a recoverable optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
