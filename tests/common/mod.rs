//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use dynaflow::adapters::sqlite::create_test_pool;
use dynaflow::domain::models::{Config, FlowType, TaskTemplate};
use dynaflow::infrastructure::Engine;
use dynaflow::{TaskExecutor, TaskInstance, TaskOutcome, Worker, WorkflowInstance};

/// Flow types used across the suites:
/// - `etl`: extract -> transform -> load (linear, inline predecessors)
/// - `fanout`: a; b and c both depend on a; c forbids parallel siblings
/// - `gather`: finalize declared first, depending on two later templates
///   (exercises placeholder edges)
/// - `solo`: one task with a retry budget of 2
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.poll_interval_secs = 1;
    config.worker.claim_batch_size = 10;
    config.worker.stale_task_secs = 1;
    config.worker.cancel_poll_secs = 1;
    config.worker.sweep_interval_secs = 0;
    config.flow_types = vec![
        FlowType::new(
            "etl",
            vec![
                TaskTemplate::new("extract"),
                TaskTemplate::new("transform").with_depends_on(vec!["extract".to_string()]),
                TaskTemplate::new("load").with_depends_on(vec!["transform".to_string()]),
            ],
        ),
        FlowType::new(
            "fanout",
            vec![
                TaskTemplate::new("a"),
                TaskTemplate::new("b").with_depends_on(vec!["a".to_string()]),
                TaskTemplate::new("c")
                    .with_depends_on(vec!["a".to_string()])
                    .with_parallel_allowed(false),
            ],
        ),
        FlowType::new(
            "gather",
            vec![
                TaskTemplate::new("finalize")
                    .with_depends_on(vec!["left".to_string(), "right".to_string()]),
                TaskTemplate::new("left"),
                TaskTemplate::new("right"),
            ],
        ),
        FlowType::new(
            "solo",
            vec![TaskTemplate::new("work").with_retry_budget(2)],
        ),
    ];
    config
}

pub async fn test_engine() -> Engine {
    let pool = create_test_pool().await.expect("in-memory pool");
    Engine::from_pool(pool, &test_config())
        .await
        .expect("engine wiring")
}

/// Executor whose outcomes are scripted per task type; unscripted task
/// types succeed with an empty result.
pub struct ScriptedExecutor {
    scripts: std::sync::Mutex<HashMap<String, Vec<TaskOutcome>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self { scripts: std::sync::Mutex::new(HashMap::new()) }
    }

    /// Queue outcomes for a task type, consumed one per attempt.
    pub fn script(&self, task_type: &str, outcomes: Vec<TaskOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_type.to_string(), outcomes);
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &TaskInstance, cancel: CancellationToken) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::Canceled;
        }
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&task.task_type) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => TaskOutcome::Succeeded { result_value: format!("{} done", task.task_type) },
        }
    }
}

/// Build a worker over the engine's repositories with a private shutdown
/// channel (returned so tests can keep it alive or trigger it).
pub fn test_worker(
    engine: &Engine,
    executor: Arc<dyn TaskExecutor>,
    processor_id: &str,
) -> (Worker, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Worker::new(
        processor_id.to_string(),
        test_config().worker,
        Arc::clone(&engine.workflows),
        Arc::clone(&engine.tasks),
        Arc::clone(&engine.workflow_service),
        Arc::clone(&engine.task_lifecycle),
        Arc::clone(&engine.maintenance_service),
        executor,
        shutdown_rx,
    );
    (worker, shutdown_tx)
}

/// Run worker passes until the workflow reaches a terminal state or the
/// pass budget runs out. Returns the final workflow row.
pub async fn drive_to_completion(
    worker: &Worker,
    engine: &Engine,
    workflow_id: i64,
    max_passes: usize,
) -> WorkflowInstance {
    for _ in 0..max_passes {
        worker.run_once().await.expect("worker pass");
        let workflow = engine
            .workflows
            .get(workflow_id)
            .await
            .expect("get workflow")
            .expect("workflow exists");
        if workflow.is_terminal() {
            return workflow;
        }
    }
    engine
        .workflows
        .get(workflow_id)
        .await
        .expect("get workflow")
        .expect("workflow exists")
}
