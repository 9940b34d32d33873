//! Recurring scheduler behavior: due detection, atomic firing, drift-free
//! advancement, and the tenant pause gate.

mod common;

use chrono::{Duration, Utc};
use common::test_engine;
use dynaflow::domain::ports::ScheduleFilter;
use dynaflow::WorkflowStatus;
use uuid::Uuid;

#[tokio::test]
async fn test_due_schedule_fires_exactly_once_per_pass() {
    let engine = test_engine().await;

    let schedule = engine
        .schedule_service
        .create("tenant-a", "etl", 1)
        .await
        .unwrap();

    // Not due yet: nothing fires
    assert_eq!(engine.schedule_service.run_pass(Utc::now()).await.unwrap(), 0);

    // Force the schedule overdue by three hours
    let mut overdue = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    overdue.next_fire_at = Utc::now() - Duration::hours(3);
    engine.schedules.update(&overdue).await.unwrap();

    let now = Utc::now();
    assert_eq!(engine.schedule_service.run_pass(now).await.unwrap(), 1);

    // Exactly one root workflow was created, in Requested state
    let workflows = engine
        .workflows
        .list(dynaflow::domain::ports::WorkflowFilter {
            tenant_id: Some("tenant-a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(workflows.len(), 1);
    let workflow = &workflows[0];
    assert_eq!(workflow.status, WorkflowStatus::Requested);
    assert_eq!(workflow.flow_type, "etl");
    assert_eq!(workflow.root_workflow_id, workflow.id);
    assert!(workflow.parent_workflow_id.is_none());

    // next_fire_at advanced exactly one interval from the firing time, not
    // from the stale overdue value
    let fired = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    assert_eq!(fired.last_fired_at.map(|t| t.timestamp()), Some(now.timestamp()));
    assert_eq!(
        fired.next_fire_at.timestamp(),
        (now + Duration::hours(1)).timestamp()
    );

    // The same pass time no longer fires
    assert_eq!(engine.schedule_service.run_pass(now).await.unwrap(), 0);
    let workflows = engine
        .workflows
        .list(dynaflow::domain::ports::WorkflowFilter::default())
        .await
        .unwrap();
    assert_eq!(workflows.len(), 1);
}

#[tokio::test]
async fn test_concurrent_firing_races_produce_one_workflow() {
    let engine = test_engine().await;

    let schedule = engine
        .schedule_service
        .create("tenant-a", "solo", 1)
        .await
        .unwrap();
    let mut overdue = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    overdue.next_fire_at = Utc::now() - Duration::minutes(30);
    engine.schedules.update(&overdue).await.unwrap();

    // Two workers read the same due snapshot and race on fire()
    let snapshot = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    let now = Utc::now();

    let wf_a = dynaflow::WorkflowInstance::new("solo", "tenant-a", Uuid::new_v4());
    let wf_b = dynaflow::WorkflowInstance::new("solo", "tenant-a", Uuid::new_v4());

    let first = engine.schedules.fire(&snapshot, now, &wf_a).await.unwrap();
    let second = engine.schedules.fire(&snapshot, now, &wf_b).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none(), "stale version must not double-fire");

    let workflows = engine
        .workflows
        .list(dynaflow::domain::ports::WorkflowFilter::default())
        .await
        .unwrap();
    assert_eq!(workflows.len(), 1);
}

#[tokio::test]
async fn test_paused_tenant_schedules_do_not_fire() {
    let engine = test_engine().await;

    let schedule = engine
        .schedule_service
        .create("tenant-a", "etl", 1)
        .await
        .unwrap();
    let mut overdue = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    overdue.next_fire_at = Utc::now() - Duration::hours(1);
    engine.schedules.update(&overdue).await.unwrap();

    engine.maintenance_service.pause("tenant-a", "ops").await.unwrap();
    assert_eq!(engine.schedule_service.run_pass(Utc::now()).await.unwrap(), 0);

    engine.maintenance_service.resume("tenant-a").await.unwrap();
    assert_eq!(engine.schedule_service.run_pass(Utc::now()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_disabled_schedule_does_not_fire() {
    let engine = test_engine().await;

    let schedule = engine
        .schedule_service
        .create("tenant-a", "etl", 1)
        .await
        .unwrap();
    let mut overdue = engine.schedules.get(schedule.id).await.unwrap().unwrap();
    overdue.next_fire_at = Utc::now() - Duration::hours(1);
    engine.schedules.update(&overdue).await.unwrap();

    engine.schedule_service.set_active(schedule.id, false).await.unwrap();
    assert_eq!(engine.schedule_service.run_pass(Utc::now()).await.unwrap(), 0);

    engine.schedule_service.set_active(schedule.id, true).await.unwrap();
    assert_eq!(engine.schedule_service.run_pass(Utc::now()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_validates_inputs() {
    let engine = test_engine().await;

    assert!(engine.schedule_service.create("tenant-a", "etl", 0).await.is_err());
    assert!(engine
        .schedule_service
        .create("tenant-a", "no-such-flow", 1)
        .await
        .is_err());

    let schedule = engine
        .schedule_service
        .create("tenant-a", "etl", 24)
        .await
        .unwrap();
    assert!(schedule.is_active);
    assert!(schedule.next_fire_at > Utc::now());

    let listed = engine
        .schedule_service
        .list(ScheduleFilter { tenant_id: Some("tenant-a".to_string()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}
