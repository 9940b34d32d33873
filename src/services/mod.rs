//! Service layer: business-logic coordination over the domain ports.

pub mod dependency_resolver;
pub mod maintenance_service;
pub mod schedule_service;
pub mod task_lifecycle;
pub mod workflow_service;

pub use dependency_resolver::DependencyResolver;
pub use maintenance_service::MaintenanceService;
pub use schedule_service::ScheduleService;
pub use task_lifecycle::TaskLifecycleService;
pub use workflow_service::{SubmitWorkflow, WorkflowService};
