//! Ports (trait seams) between the domain and the outside world.

pub mod maintenance_repository;
pub mod schedule_repository;
pub mod task_executor;
pub mod task_repository;
pub mod workflow_repository;

pub use maintenance_repository::MaintenanceRepository;
pub use schedule_repository::{ScheduleFilter, ScheduleRepository};
pub use task_executor::{NullTaskExecutor, TaskExecutor};
pub use task_repository::{TaskFilter, TaskRepository};
pub use workflow_repository::{WorkflowFilter, WorkflowRepository};
