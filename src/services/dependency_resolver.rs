//! Dependency graph resolution for one workflow's task set.
//!
//! The resolver unifies the inline predecessor column with the join-table
//! edges into a single view, and answers three questions: which pending
//! tasks may become eligible, which tasks must be canceled because a
//! predecessor terminated without success, and whether the graph has a
//! cycle. It works on a fresh snapshot each pass; nothing is cached across
//! a workflow's task-creation window, so placeholder edges that get
//! resolved are picked up on the next scan.

use std::collections::{HashMap, HashSet};

use crate::domain::models::{TaskDependency, TaskInstance, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

struct PredecessorIndex {
    /// task id -> predecessor task ids (inline + resolved join rows)
    predecessors: HashMap<i64, Vec<i64>>,
    /// task ids blocked by at least one placeholder edge
    blocked_by_placeholder: HashSet<i64>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Pending tasks whose every predecessor is terminal-successful and
    /// that are not blocked by a placeholder edge.
    pub fn eligible_tasks<'a>(
        &self,
        tasks: &'a [TaskInstance],
        edges: &[TaskDependency],
    ) -> Vec<&'a TaskInstance> {
        let index = build_index(tasks, edges);
        let by_id: HashMap<i64, &TaskInstance> = tasks.iter().map(|t| (t.id, t)).collect();

        tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending && !task.cancel_requested)
            .filter(|task| !index.blocked_by_placeholder.contains(&task.id))
            .filter(|task| {
                index
                    .predecessors
                    .get(&task.id)
                    .map_or(true, |preds| {
                        preds.iter().all(|pred_id| {
                            by_id
                                .get(pred_id)
                                .is_some_and(|pred| pred.status == TaskStatus::Succeeded)
                        })
                    })
            })
            .collect()
    }

    /// Non-terminal tasks that depend, directly or transitively, on a
    /// predecessor that reached a terminal state without success.
    ///
    /// This is the cancel-on-failure policy: dependents of a canceled or
    /// exhausted task are canceled rather than left permanently blocked.
    /// One pass covers the whole transitive closure.
    pub fn cancel_targets(
        &self,
        tasks: &[TaskInstance],
        edges: &[TaskDependency],
    ) -> Vec<i64> {
        let index = build_index(tasks, edges);
        let by_id: HashMap<i64, &TaskInstance> = tasks.iter().map(|t| (t.id, t)).collect();

        // dependents adjacency: predecessor id -> dependent ids
        let mut dependents: HashMap<i64, Vec<i64>> = HashMap::new();
        for (task_id, preds) in &index.predecessors {
            for pred_id in preds {
                dependents.entry(*pred_id).or_default().push(*task_id);
            }
        }

        let mut frontier: Vec<i64> = tasks
            .iter()
            .filter(|t| t.is_terminal() && t.status != TaskStatus::Succeeded)
            .map(|t| t.id)
            .collect();

        let mut doomed: HashSet<i64> = HashSet::new();
        while let Some(pred_id) = frontier.pop() {
            if let Some(children) = dependents.get(&pred_id) {
                for &child_id in children {
                    if doomed.insert(child_id) {
                        frontier.push(child_id);
                    }
                }
            }
        }

        let mut targets: Vec<i64> = doomed
            .into_iter()
            .filter(|id| by_id.get(id).is_some_and(|t| !t.is_terminal()))
            .collect();
        targets.sort_unstable();
        targets
    }

    /// DFS-based cycle detection over the resolved dependency graph.
    /// Returns the ids along one cycle if any exists.
    pub fn detect_cycle(
        &self,
        tasks: &[TaskInstance],
        edges: &[TaskDependency],
    ) -> Option<Vec<i64>> {
        let index = build_index(tasks, edges);

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task in tasks {
            if !visited.contains(&task.id)
                && visit(task.id, &index.predecessors, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }
        None
    }
}

fn build_index(tasks: &[TaskInstance], edges: &[TaskDependency]) -> PredecessorIndex {
    let mut predecessors: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut blocked_by_placeholder = HashSet::new();

    for task in tasks {
        if let Some(pred_id) = task.predecessor_task_id {
            predecessors.entry(task.id).or_default().push(pred_id);
        }
    }

    for edge in edges {
        if edge.placeholder {
            blocked_by_placeholder.insert(edge.task_id);
            continue;
        }
        match edge.predecessor_task_id {
            Some(pred_id) => {
                let preds = predecessors.entry(edge.task_id).or_default();
                if !preds.contains(&pred_id) {
                    preds.push(pred_id);
                }
            }
            // A non-placeholder edge without a predecessor id is malformed;
            // treat it as blocking rather than satisfied.
            None => {
                blocked_by_placeholder.insert(edge.task_id);
            }
        }
    }

    PredecessorIndex { predecessors, blocked_by_placeholder }
}

fn visit(
    node: i64,
    predecessors: &HashMap<i64, Vec<i64>>,
    visited: &mut HashSet<i64>,
    rec_stack: &mut HashSet<i64>,
    path: &mut Vec<i64>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(preds) = predecessors.get(&node) {
        for &pred in preds {
            if !visited.contains(&pred) {
                if visit(pred, predecessors, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&pred) {
                if let Some(start) = path.iter().position(|&id| id == pred) {
                    path.drain(0..start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn task(id: i64, status: TaskStatus) -> TaskInstance {
        let mut t = TaskInstance::new(1, format!("task-{id}"), Uuid::new_v4());
        t.id = id;
        t.status = status;
        t
    }

    #[test]
    fn test_no_dependencies_is_eligible() {
        let resolver = DependencyResolver::new();
        let tasks = vec![task(1, TaskStatus::Pending)];
        let eligible = resolver.eligible_tasks(&tasks, &[]);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, 1);
    }

    #[test]
    fn test_inline_predecessor_gates_eligibility() {
        let resolver = DependencyResolver::new();
        let pred = task(1, TaskStatus::Running);
        let dep = task(2, TaskStatus::Pending).with_predecessor(1);

        let tasks = vec![pred, dep];
        assert!(resolver.eligible_tasks(&tasks, &[]).is_empty());

        let pred = task(1, TaskStatus::Succeeded);
        let dep = task(2, TaskStatus::Pending).with_predecessor(1);
        let tasks = vec![pred, dep];
        let eligible = resolver.eligible_tasks(&tasks, &[]);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, 2);
    }

    #[test]
    fn test_join_edges_require_all_predecessors() {
        let resolver = DependencyResolver::new();
        let tasks = vec![
            task(1, TaskStatus::Succeeded),
            task(2, TaskStatus::Running),
            task(3, TaskStatus::Pending),
        ];
        let edges = vec![TaskDependency::new(1, 3, 1), TaskDependency::new(1, 3, 2)];
        assert!(resolver.eligible_tasks(&tasks, &edges).is_empty());

        let tasks = vec![
            task(1, TaskStatus::Succeeded),
            task(2, TaskStatus::Succeeded),
            task(3, TaskStatus::Pending),
        ];
        let eligible = resolver.eligible_tasks(&tasks, &edges);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, 3);
    }

    #[test]
    fn test_placeholder_edge_never_satisfied() {
        let resolver = DependencyResolver::new();
        let tasks = vec![task(1, TaskStatus::Succeeded), task(2, TaskStatus::Pending)];
        let edges = vec![TaskDependency::placeholder(1, 2, "later-task")];
        assert!(resolver.eligible_tasks(&tasks, &edges).is_empty());

        // Resolving the edge (re-scan with fresh rows) unblocks the task
        let mut edge = TaskDependency::placeholder(1, 2, "later-task");
        edge.resolve(1);
        let eligible = resolver.eligible_tasks(&tasks, &[edge]);
        assert_eq!(eligible.len(), 1);
    }

    #[test]
    fn test_cancel_requested_blocks_eligibility() {
        let resolver = DependencyResolver::new();
        let mut t = task(1, TaskStatus::Pending);
        t.cancel_requested = true;
        assert!(resolver.eligible_tasks(&[t], &[]).is_empty());
    }

    #[test]
    fn test_cancel_propagates_transitively() {
        let resolver = DependencyResolver::new();
        // 1 (canceled) <- 2 <- 3, and 4 independent
        let tasks = vec![
            task(1, TaskStatus::Canceled),
            task(2, TaskStatus::Pending).with_predecessor(1),
            task(3, TaskStatus::Pending).with_predecessor(2),
            task(4, TaskStatus::Pending),
        ];
        let targets = resolver.cancel_targets(&tasks, &[]);
        assert_eq!(targets, vec![2, 3]);
    }

    #[test]
    fn test_exhausted_predecessor_cancels_dependents() {
        let resolver = DependencyResolver::new();
        let tasks = vec![
            task(1, TaskStatus::Exhausted),
            task(2, TaskStatus::Pending).with_predecessor(1),
        ];
        assert_eq!(resolver.cancel_targets(&tasks, &[]), vec![2]);
    }

    #[test]
    fn test_cancel_targets_skip_terminal_dependents() {
        let resolver = DependencyResolver::new();
        let tasks = vec![
            task(1, TaskStatus::Canceled),
            task(2, TaskStatus::Succeeded).with_predecessor(1),
        ];
        assert!(resolver.cancel_targets(&tasks, &[]).is_empty());
    }

    #[test]
    fn test_detect_cycle() {
        let resolver = DependencyResolver::new();
        let tasks = vec![
            task(1, TaskStatus::Pending).with_predecessor(2),
            task(2, TaskStatus::Pending).with_predecessor(1),
        ];
        assert!(resolver.detect_cycle(&tasks, &[]).is_some());

        let tasks = vec![
            task(1, TaskStatus::Pending),
            task(2, TaskStatus::Pending).with_predecessor(1),
        ];
        assert!(resolver.detect_cycle(&tasks, &[]).is_none());
    }

    #[test]
    fn test_cycle_through_join_edges() {
        let resolver = DependencyResolver::new();
        let tasks = vec![task(1, TaskStatus::Pending), task(2, TaskStatus::Pending)];
        let edges = vec![TaskDependency::new(1, 1, 2), TaskDependency::new(1, 2, 1)];
        assert!(resolver.detect_cycle(&tasks, &edges).is_some());
    }
}
