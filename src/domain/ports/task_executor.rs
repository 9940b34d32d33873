use crate::domain::models::{TaskInstance, TaskOutcome};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Port for the external system that runs task bodies.
///
/// The engine treats `param_1`/`param_2`/`result_value` as opaque; decoding
/// them is the executor's responsibility. Cancellation is cooperative: the
/// executor is expected to watch the token and return `TaskOutcome::Canceled`
/// when it fires.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskInstance, cancel: CancellationToken) -> TaskOutcome;
}

/// Executor that succeeds immediately without doing any work.
///
/// Used where execution semantics don't matter: wiring tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct NullTaskExecutor;

impl NullTaskExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for NullTaskExecutor {
    async fn execute(&self, _task: &TaskInstance, cancel: CancellationToken) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::Canceled;
        }
        TaskOutcome::Succeeded { result_value: String::new() }
    }
}
