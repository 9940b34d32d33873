//! DynaFlow - DAG workflow and task orchestration engine.
//!
//! Workflows expand into task DAGs; independent worker processes claim
//! eligible tasks through optimistic-concurrency updates, execute them via
//! an external executor port, and feed completions back into the
//! dependency resolver until the workflow reaches a terminal state.
//! Recurring schedules create root workflows on a fixed interval, and a
//! per-tenant maintenance gate can pause all claiming and scheduling.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, state machines, and ports
//! - **Service Layer** (`services`): business logic over the ports
//! - **Application Layer** (`application`): the long-running worker loops
//! - **Adapters** (`adapters`): SQLite implementations of the ports
//! - **Infrastructure** (`infrastructure`): configuration and wiring
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Scheduler, Worker, WorkerPassStats};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, FlowType, FlowTypeRegistry, MaintenanceControl, RecurringSchedule, TaskDependency,
    TaskInstance, TaskOutcome, TaskStatus, TaskTemplate, WorkflowInstance, WorkflowStatus,
};
pub use domain::ports::{
    MaintenanceRepository, NullTaskExecutor, ScheduleRepository, TaskExecutor, TaskRepository,
    WorkflowRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::Engine;
pub use services::{
    DependencyResolver, MaintenanceService, ScheduleService, SubmitWorkflow, TaskLifecycleService,
    WorkflowService,
};
