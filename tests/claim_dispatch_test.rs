//! Claim linearizability, parallel-run exclusion, tenant pause, and the
//! stale-claim reaper.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{test_engine, test_worker, ScriptedExecutor};
use dynaflow::{SubmitWorkflow, TaskExecutor, TaskStatus, WorkflowStatus};
use uuid::Uuid;

#[tokio::test]
async fn test_claim_race_has_exactly_one_winner() {
    let engine = test_engine().await;

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("solo", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();

    let candidates = engine
        .tasks
        .list_claim_candidates(&[], Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];

    // Two workers race on the same snapshot of the row: the version guard
    // lets exactly one through.
    let first = engine
        .tasks
        .claim(candidate, "worker-1", Utc::now())
        .await
        .unwrap();
    let second = engine
        .tasks
        .claim(candidate, "worker-2", Utc::now())
        .await
        .unwrap();

    let claimed = first.expect("first claim wins");
    assert!(second.is_none(), "second claim must lose");
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.processor_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn test_claim_rejects_cancel_requested_task() {
    let engine = test_engine().await;

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("solo", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();

    let candidate = engine
        .tasks
        .list_claim_candidates(&[], Utc::now(), 10)
        .await
        .unwrap()
        .remove(0);

    // Cancellation lands between the candidate read and the claim; the
    // claim loses because the row moved.
    engine.task_lifecycle.request_cancel(candidate.id).await.unwrap();

    let claim = engine
        .tasks
        .claim(&candidate, "worker-1", Utc::now())
        .await
        .unwrap();
    assert!(claim.is_none());
}

#[tokio::test]
async fn test_parallel_run_exclusion() {
    let engine = test_engine().await;
    let executor = Arc::new(ScriptedExecutor::new());
    let (worker, _shutdown) = test_worker(&engine, executor, "worker-1");

    // fanout: a; b (parallel ok) and c (parallel_allowed = false) both
    // depend on a
    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("fanout", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();

    // Run a to completion so b and c are both eligible
    worker.run_once().await.unwrap();
    let tasks = engine.tasks.list_by_workflow(workflow.id).await.unwrap();
    let b = tasks.iter().find(|t| t.task_type == "b").unwrap().clone();
    let c = tasks.iter().find(|t| t.task_type == "c").unwrap().clone();
    assert_eq!(b.status, TaskStatus::Eligible);
    assert_eq!(c.status, TaskStatus::Eligible);

    // While b runs, the non-parallel c may not start
    let b_claimed = engine
        .tasks
        .claim(&b, "worker-1", Utc::now())
        .await
        .unwrap()
        .expect("b claim");
    assert!(engine
        .tasks
        .claim(&c, "worker-2", Utc::now())
        .await
        .unwrap()
        .is_none());

    // Release b; now c may start, and while the non-parallel c runs, b's
    // sibling slot is closed too
    let mut b_done = b_claimed;
    b_done
        .apply_outcome(&dynaflow::TaskOutcome::Succeeded { result_value: String::new() })
        .unwrap();
    engine.tasks.update(&b_done).await.unwrap();

    let c = engine.tasks.get(c.id).await.unwrap().unwrap();
    let c_claimed = engine
        .tasks
        .claim(&c, "worker-2", Utc::now())
        .await
        .unwrap()
        .expect("c claim after b finished");
    assert_eq!(c_claimed.status, TaskStatus::Running);
}

#[tokio::test]
async fn test_non_parallel_running_blocks_siblings() {
    let engine = test_engine().await;
    let executor = Arc::new(ScriptedExecutor::new());
    let (worker, _shutdown) = test_worker(&engine, executor, "worker-1");

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("fanout", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();
    worker.run_once().await.unwrap();

    let tasks = engine.tasks.list_by_workflow(workflow.id).await.unwrap();
    let b = tasks.iter().find(|t| t.task_type == "b").unwrap().clone();
    let c = tasks.iter().find(|t| t.task_type == "c").unwrap().clone();

    // Claim the non-parallel c first: b must wait even though b itself
    // allows parallel siblings
    engine
        .tasks
        .claim(&c, "worker-2", Utc::now())
        .await
        .unwrap()
        .expect("c claim");
    assert!(engine
        .tasks
        .claim(&b, "worker-1", Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_paused_tenant_blocks_claims_but_not_running_tasks() {
    let engine = test_engine().await;

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("etl", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();

    // Claim the first task, then pause the tenant mid-run
    let candidate = engine
        .tasks
        .list_claim_candidates(&[], Utc::now(), 10)
        .await
        .unwrap()
        .remove(0);
    let running = engine
        .tasks
        .claim(&candidate, "worker-1", Utc::now())
        .await
        .unwrap()
        .expect("claim before pause");

    engine.maintenance_service.pause("tenant-a", "ops").await.unwrap();
    let paused = engine.maintenance_service.paused_tenants().await.unwrap();
    assert_eq!(paused, vec!["tenant-a".to_string()]);

    // No candidates surface for the paused tenant
    let candidates = engine
        .tasks
        .list_claim_candidates(&paused, Utc::now(), 10)
        .await
        .unwrap();
    assert!(candidates.is_empty());

    // The in-flight task is unaffected and can still be finalized
    let finalized = engine
        .task_lifecycle
        .finalize(
            running.id,
            &dynaflow::TaskOutcome::Succeeded { result_value: "ok".to_string() },
        )
        .await
        .unwrap();
    assert_eq!(finalized.status, TaskStatus::Succeeded);

    // Resume opens the gate again
    engine.maintenance_service.resume("tenant-a").await.unwrap();
    let paused = engine.maintenance_service.paused_tenants().await.unwrap();
    assert!(paused.is_empty());
    engine.workflow_service.refresh(workflow.id).await.unwrap();
    let candidates = engine
        .tasks
        .list_claim_candidates(&paused, Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn test_paused_tenant_blocks_expansion() {
    let engine = test_engine().await;

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("etl", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();

    engine.maintenance_service.pause("tenant-a", "ops").await.unwrap();
    let paused = engine.maintenance_service.paused_tenants().await.unwrap();

    let expandable = engine
        .workflows
        .list_expandable(&paused, Utc::now(), 10)
        .await
        .unwrap();
    assert!(expandable.is_empty());

    engine.maintenance_service.resume("tenant-a").await.unwrap();
    let expandable = engine
        .workflows
        .list_expandable(&[], Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(expandable.len(), 1);
    assert_eq!(expandable[0].id, workflow.id);
}

#[tokio::test]
async fn test_reaper_recovers_stale_claim() {
    let engine = test_engine().await;

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("solo", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    engine.workflow_service.expand(workflow.id).await.unwrap();

    // A worker claims the task and dies without finalizing
    let candidate = engine
        .tasks
        .list_claim_candidates(&[], Utc::now(), 10)
        .await
        .unwrap()
        .remove(0);
    let stranded = engine
        .tasks
        .claim(&candidate, "dead-worker", Utc::now())
        .await
        .unwrap()
        .expect("claim");
    assert_eq!(stranded.status, TaskStatus::Running);

    // Past the staleness deadline the sweep reaps it back to eligible as a
    // retryable failure
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let executor = Arc::new(ScriptedExecutor::new());
    let (worker, _shutdown) = test_worker(&engine, executor, "worker-2");
    let stats = worker.run_once().await.unwrap();
    assert_eq!(stats.reaped, 1);

    let task = engine.tasks.get(stranded.id).await.unwrap().unwrap();
    assert!(
        task.status == TaskStatus::Succeeded || task.status == TaskStatus::Eligible,
        "reaped task is re-eligible (and may already have been re-claimed)"
    );
    assert_eq!(task.retry_count, 1);
}

#[tokio::test]
async fn test_sweep_heartbeat_single_owner() {
    let engine = test_engine().await;
    engine.maintenance_service.ensure_tenant("tenant-a").await.unwrap();

    let control = engine.maintenance_service.get("tenant-a").await.unwrap();
    let now = Utc::now();

    let held = engine
        .maintenance_service
        .try_claim_sweep(&control, "worker-1", now)
        .await
        .unwrap()
        .expect("first sweep claim");
    assert!(held.sweep_started);
    assert_eq!(held.sweep_processor_id.as_deref(), Some("worker-1"));

    // Second worker with the stale snapshot loses
    assert!(engine
        .maintenance_service
        .try_claim_sweep(&control, "worker-2", now)
        .await
        .unwrap()
        .is_none());

    // Completion releases and advances the heartbeat
    engine
        .maintenance_service
        .finish_sweep(&held, now, chrono::Duration::minutes(5))
        .await
        .unwrap();
    let control = engine.maintenance_service.get("tenant-a").await.unwrap();
    assert!(!control.sweep_started);
    assert!(control.sweep_completed);
    assert_eq!(control.last_sweep_at.map(|t| t.timestamp()), Some(now.timestamp()));
    assert!(!control.is_sweep_due(now));
}

#[tokio::test]
async fn test_two_workers_share_a_workflow() {
    let engine = test_engine().await;
    let executor: Arc<dyn TaskExecutor> = Arc::new(ScriptedExecutor::new());
    let (worker_1, _s1) = test_worker(&engine, Arc::clone(&executor), "worker-1");
    let (worker_2, _s2) = test_worker(&engine, executor, "worker-2");

    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("etl", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();

    // Alternate passes between two workers; the workflow still completes
    // exactly once with every task succeeded.
    for _ in 0..6 {
        worker_1.run_once().await.unwrap();
        worker_2.run_once().await.unwrap();
        let wf = engine.workflows.get(workflow.id).await.unwrap().unwrap();
        if wf.is_terminal() {
            break;
        }
    }

    let wf = engine.workflows.get(workflow.id).await.unwrap().unwrap();
    assert_eq!(wf.status, WorkflowStatus::Succeeded);
    let tasks = engine.tasks.list_by_workflow(workflow.id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Succeeded));
}
