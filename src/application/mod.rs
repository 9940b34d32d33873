//! Application layer: the long-running loops each worker process hosts.

pub mod scheduler;
pub mod worker;

pub use scheduler::Scheduler;
pub use worker::{Worker, WorkerPassStats};
