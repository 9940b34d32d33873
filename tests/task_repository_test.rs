//! Repository-level behavior: id assignment, version-token semantics,
//! bulk operations, and dependency-edge queries against SQLite.

mod common;

use chrono::Utc;
use common::test_engine;
use dynaflow::domain::ports::TaskFilter;
use dynaflow::{DomainError, SubmitWorkflow, TaskDependency, TaskInstance, TaskStatus};
use uuid::Uuid;

async fn seeded_workflow(engine: &dynaflow::Engine) -> i64 {
    let workflow = engine
        .workflow_service
        .submit(SubmitWorkflow::new("etl", "tenant-a", Uuid::new_v4()))
        .await
        .unwrap();
    workflow.id
}

#[tokio::test]
async fn test_insert_assigns_ids_and_roundtrips() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let task = TaskInstance::new(workflow_id, "extract", Uuid::new_v4())
        .with_params("in", "out")
        .with_priority(5);
    let id = engine.tasks.insert(&task).await.unwrap();
    assert!(id > 0);

    let loaded = engine.tasks.get(id).await.unwrap().unwrap();
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.code, task.code);
    assert_eq!(loaded.row_version, 1);
    assert_eq!(loaded.task_type, "extract");
    assert_eq!(loaded.param_1, "in");
    assert_eq!(loaded.param_2, "out");
    assert_eq!(loaded.priority_level, 5);
    assert_eq!(loaded.status, TaskStatus::Pending);

    let by_code = engine.tasks.get_by_code(task.code).await.unwrap().unwrap();
    assert_eq!(by_code.id, id);
}

#[tokio::test]
async fn test_stale_version_update_conflicts() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let task = TaskInstance::new(workflow_id, "extract", Uuid::new_v4());
    let id = engine.tasks.insert(&task).await.unwrap();

    let snapshot_a = engine.tasks.get(id).await.unwrap().unwrap();
    let snapshot_b = snapshot_a.clone();

    // First writer wins and bumps the version
    let mut a = snapshot_a;
    a.cancel_requested = true;
    engine.tasks.update(&a).await.unwrap();
    assert_eq!(engine.tasks.get(id).await.unwrap().unwrap().row_version, 2);

    // Second writer with the stale token gets a conflict, not a silent
    // overwrite
    let mut b = snapshot_b;
    b.result_value = "lost update".to_string();
    let err = engine.tasks.update(&b).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict { .. }));

    let current = engine.tasks.get(id).await.unwrap().unwrap();
    assert!(current.cancel_requested);
    assert_eq!(current.result_value, "");
}

#[tokio::test]
async fn test_update_missing_task_is_not_found() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let mut task = TaskInstance::new(workflow_id, "extract", Uuid::new_v4());
    task.id = 9999;
    let err = engine.tasks.update(&task).await.unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(9999)));
}

#[tokio::test]
async fn test_insert_bulk_returns_ids_in_order() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let subject = Uuid::new_v4();
    let tasks = vec![
        TaskInstance::new(workflow_id, "one", subject),
        TaskInstance::new(workflow_id, "two", subject),
        TaskInstance::new(workflow_id, "three", subject),
    ];
    let ids = engine.tasks.insert_bulk(&tasks).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);

    let listed = engine.tasks.list_by_workflow(workflow_id).await.unwrap();
    assert_eq!(listed.len(), 3);
}

#[tokio::test]
async fn test_update_bulk_rolls_back_on_stale_row() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let subject = Uuid::new_v4();
    let ids = engine
        .tasks
        .insert_bulk(&[
            TaskInstance::new(workflow_id, "one", subject),
            TaskInstance::new(workflow_id, "two", subject),
        ])
        .await
        .unwrap();

    let mut one = engine.tasks.get(ids[0]).await.unwrap().unwrap();
    let mut two = engine.tasks.get(ids[1]).await.unwrap().unwrap();

    // Stale out the second row behind the batch's back
    let mut interloper = two.clone();
    interloper.cancel_requested = true;
    engine.tasks.update(&interloper).await.unwrap();

    one.result_value = "batched".to_string();
    two.result_value = "batched".to_string();
    let err = engine.tasks.update_bulk(&[one, two]).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict { .. }));

    // All-or-nothing: the first row was rolled back too
    let one = engine.tasks.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(one.result_value, "");

    // With fresh versions the batch goes through
    let mut one = engine.tasks.get(ids[0]).await.unwrap().unwrap();
    let mut two = engine.tasks.get(ids[1]).await.unwrap().unwrap();
    one.result_value = "batched".to_string();
    two.result_value = "batched".to_string();
    engine.tasks.update_bulk(&[one, two]).await.unwrap();
    assert_eq!(
        engine.tasks.get(ids[0]).await.unwrap().unwrap().result_value,
        "batched"
    );
}

#[tokio::test]
async fn test_list_by_predecessor_unifies_inline_and_edges() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;

    let subject = Uuid::new_v4();
    let pred_id = engine
        .tasks
        .insert(&TaskInstance::new(workflow_id, "pred", subject))
        .await
        .unwrap();

    // Dependent via the inline column
    let inline_dep = TaskInstance::new(workflow_id, "inline-dep", subject)
        .with_predecessor(pred_id);
    let inline_id = engine.tasks.insert(&inline_dep).await.unwrap();

    // Dependent via a join edge
    let edge_dep_id = engine
        .tasks
        .insert(&TaskInstance::new(workflow_id, "edge-dep", subject))
        .await
        .unwrap();
    engine
        .tasks
        .insert_dependencies(&[TaskDependency::new(workflow_id, edge_dep_id, pred_id)])
        .await
        .unwrap();

    // Placeholder edges don't count as dependencies yet
    let phantom_id = engine
        .tasks
        .insert(&TaskInstance::new(workflow_id, "phantom", subject))
        .await
        .unwrap();
    engine
        .tasks
        .insert_dependencies(&[TaskDependency::placeholder(workflow_id, phantom_id, "pred")])
        .await
        .unwrap();

    let dependents = engine.tasks.list_by_predecessor(pred_id).await.unwrap();
    let ids: Vec<i64> = dependents.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![inline_id, edge_dep_id]);
}

#[tokio::test]
async fn test_filtered_list_and_count() {
    let engine = test_engine().await;
    let workflow_id = seeded_workflow(&engine).await;
    engine.workflow_service.expand(workflow_id).await.unwrap();

    let eligible = engine
        .tasks
        .list(TaskFilter {
            workflow_id: Some(workflow_id),
            status: Some(TaskStatus::Eligible),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].task_type, "extract");

    let total = engine
        .tasks
        .count(TaskFilter { workflow_id: Some(workflow_id), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(total, 3);

    // Claim stamps the processor, which the processor filter finds
    let candidate = eligible[0].clone();
    engine
        .tasks
        .claim(&candidate, "worker-42", Utc::now())
        .await
        .unwrap()
        .expect("claim");
    let mine = engine
        .tasks
        .list(TaskFilter { processor_id: Some("worker-42".to_string()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].task_type, "extract");
}
