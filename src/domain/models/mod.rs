//! Domain models for the orchestration engine.

pub mod config;
pub mod dependency;
pub mod flow_type;
pub mod maintenance;
pub mod schedule;
pub mod task;
pub mod workflow;

pub use config::{Config, DatabaseConfig, LoggingConfig, SchedulerConfig, WorkerConfig};
pub use dependency::TaskDependency;
pub use flow_type::{FlowType, FlowTypeRegistry, TaskTemplate};
pub use maintenance::MaintenanceControl;
pub use schedule::RecurringSchedule;
pub use task::{TaskInstance, TaskOutcome, TaskStatus};
pub use workflow::{WorkflowInstance, WorkflowStatus};
