//! Property tests over the dependency graph resolver.

use dynaflow::services::DependencyResolver;
use dynaflow::{TaskDependency, TaskInstance, TaskStatus};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Build a layered DAG: task i may depend on a subset of earlier tasks,
/// with statuses drawn from the given pool.
fn layered_graph(
    size: usize,
    dep_seed: u64,
    status_seed: u64,
) -> (Vec<TaskInstance>, Vec<TaskDependency>) {
    let statuses = [
        TaskStatus::Pending,
        TaskStatus::Eligible,
        TaskStatus::Running,
        TaskStatus::Succeeded,
        TaskStatus::Exhausted,
        TaskStatus::Canceled,
    ];

    let mut tasks = Vec::new();
    let mut edges = Vec::new();

    for i in 0..size {
        let id = (i + 1) as i64;
        let mut task = TaskInstance::new(1, format!("task-{id}"), Uuid::new_v4());
        task.id = id;
        task.status = statuses[((status_seed >> (i % 16)) as usize + i) % statuses.len()];
        // Keep timestamps consistent with terminal statuses
        if task.status.is_terminal() {
            task.completed_at = Some(chrono::Utc::now());
        }
        tasks.push(task);

        // Each task depends on up to two strictly-earlier tasks
        if i > 0 && dep_seed >> (i % 32) & 1 == 1 {
            let pred = ((dep_seed >> (i % 16)) as usize % i) + 1;
            edges.push(TaskDependency::new(1, id, pred as i64));
        }
        if i > 1 && dep_seed >> ((i + 7) % 32) & 1 == 1 {
            let pred = ((dep_seed >> ((i + 3) % 16)) as usize % i) + 1;
            edges.push(TaskDependency::new(1, id, pred as i64));
        }
    }

    (tasks, edges)
}

proptest! {
    /// Property: every task the resolver marks eligible is pending with all
    /// predecessors terminal-successful.
    #[test]
    fn prop_eligible_tasks_have_satisfied_predecessors(
        size in 1usize..30,
        dep_seed in any::<u64>(),
        status_seed in any::<u64>(),
    ) {
        let resolver = DependencyResolver::new();
        let (tasks, edges) = layered_graph(size, dep_seed, status_seed);

        let by_id: HashMap<i64, &TaskInstance> = tasks.iter().map(|t| (t.id, t)).collect();
        let eligible = resolver.eligible_tasks(&tasks, &edges);

        for task in &eligible {
            prop_assert_eq!(task.status, TaskStatus::Pending);
            for edge in edges.iter().filter(|e| e.task_id == task.id) {
                let pred = by_id[&edge.predecessor_task_id.unwrap()];
                prop_assert_eq!(
                    pred.status,
                    TaskStatus::Succeeded,
                    "task {} eligible with unfinished predecessor {}",
                    task.id,
                    pred.id
                );
            }
        }
    }

    /// Property: a placeholder edge always blocks its dependent, no matter
    /// the rest of the graph.
    #[test]
    fn prop_placeholder_always_blocks(
        size in 2usize..30,
        dep_seed in any::<u64>(),
        blocked in 1usize..30,
    ) {
        let resolver = DependencyResolver::new();
        let (mut tasks, mut edges) = layered_graph(size, dep_seed, 0);
        // Force everything pending so only edges decide
        for task in &mut tasks {
            task.status = TaskStatus::Pending;
            task.completed_at = None;
        }

        let blocked_id = ((blocked % size) + 1) as i64;
        edges.push(TaskDependency::placeholder(1, blocked_id, "not-yet-materialized"));

        let eligible: HashSet<i64> =
            resolver.eligible_tasks(&tasks, &edges).iter().map(|t| t.id).collect();
        prop_assert!(!eligible.contains(&blocked_id));
    }

    /// Property: cancel targets are exactly the non-terminal transitive
    /// dependents of unsuccessful terminal tasks — no eligible task is both
    /// eligible and doomed.
    #[test]
    fn prop_cancel_targets_are_transitive_and_disjoint_from_eligible(
        size in 1usize..30,
        dep_seed in any::<u64>(),
        status_seed in any::<u64>(),
    ) {
        let resolver = DependencyResolver::new();
        let (tasks, edges) = layered_graph(size, dep_seed, status_seed);

        let by_id: HashMap<i64, &TaskInstance> = tasks.iter().map(|t| (t.id, t)).collect();
        let targets: HashSet<i64> = resolver.cancel_targets(&tasks, &edges).into_iter().collect();

        // Targets are non-terminal
        for id in &targets {
            prop_assert!(!by_id[id].is_terminal());
        }

        // Closure: a non-terminal dependent of a target (or of a failed
        // terminal task) is itself a target
        for edge in &edges {
            let pred_id = edge.predecessor_task_id.unwrap();
            let pred = by_id[&pred_id];
            let dependent = by_id[&edge.task_id];
            let pred_doomed =
                (pred.is_terminal() && pred.status != TaskStatus::Succeeded) || targets.contains(&pred_id);
            if pred_doomed && !dependent.is_terminal() {
                prop_assert!(
                    targets.contains(&edge.task_id),
                    "dependent {} of doomed predecessor {} not targeted",
                    edge.task_id,
                    pred_id
                );
            }
        }

        // Eligible and doomed are disjoint
        let eligible: HashSet<i64> =
            resolver.eligible_tasks(&tasks, &edges).iter().map(|t| t.id).collect();
        prop_assert!(eligible.is_disjoint(&targets));
    }

    /// Property: layered construction never produces a cycle, and reversing
    /// one edge onto itself does.
    #[test]
    fn prop_cycle_detection(
        size in 2usize..30,
        dep_seed in any::<u64>(),
    ) {
        let resolver = DependencyResolver::new();
        let (tasks, mut edges) = layered_graph(size, dep_seed, 0);

        prop_assert!(resolver.detect_cycle(&tasks, &edges).is_none());

        // Introduce a back edge to close a loop over the first edge, if any
        if let Some(first) = edges.first().cloned() {
            let pred = first.predecessor_task_id.unwrap();
            edges.push(TaskDependency::new(1, pred, first.task_id));
            prop_assert!(resolver.detect_cycle(&tasks, &edges).is_some());
        }
    }
}
