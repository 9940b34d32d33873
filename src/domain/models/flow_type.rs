//! Workflow type definitions.
//!
//! A flow type names the ordered set of task templates a workflow of that
//! type expands into, including the dependency edges between them. Flow
//! types come from configuration and are validated once at load.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Template for one task within a flow type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Unique task name within the flow type
    pub task_type: String,
    /// Default opaque input
    #[serde(default)]
    pub param_1: String,
    /// Default opaque input
    #[serde(default)]
    pub param_2: String,
    /// Retry budget for tasks created from this template
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// If false, no sibling may run concurrently with this task
    #[serde(default = "default_parallel_allowed")]
    pub parallel_allowed: bool,
    /// task_type names of predecessor templates
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Delay added to the workflow's min start for this task
    #[serde(default)]
    pub start_delay_secs: u64,
}

const fn default_max_retry_count() -> u32 {
    3
}

const fn default_parallel_allowed() -> bool {
    true
}

impl TaskTemplate {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            param_1: String::new(),
            param_2: String::new(),
            max_retry_count: default_max_retry_count(),
            parallel_allowed: default_parallel_allowed(),
            depends_on: Vec::new(),
            start_delay_secs: 0,
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_params(mut self, param_1: impl Into<String>, param_2: impl Into<String>) -> Self {
        self.param_1 = param_1.into();
        self.param_2 = param_2.into();
        self
    }

    pub fn with_retry_budget(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    pub fn with_parallel_allowed(mut self, parallel_allowed: bool) -> Self {
        self.parallel_allowed = parallel_allowed;
        self
    }
}

/// A named workflow type: the task template set it expands into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowType {
    pub name: String,
    pub tasks: Vec<TaskTemplate>,
}

impl FlowType {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskTemplate>) -> Self {
        Self { name: name.into(), tasks }
    }
}

/// Validated lookup of flow types by name.
#[derive(Debug, Clone, Default)]
pub struct FlowTypeRegistry {
    flow_types: HashMap<String, FlowType>,
}

impl FlowTypeRegistry {
    /// Build a registry, rejecting duplicate names, unknown predecessor
    /// references, self-dependencies, and dependency cycles.
    pub fn new(flow_types: Vec<FlowType>) -> Result<Self, String> {
        let mut map = HashMap::new();
        for flow in flow_types {
            validate_flow_type(&flow)?;
            if map.insert(flow.name.clone(), flow).is_some() {
                return Err("Duplicate flow type name".to_string());
            }
        }
        Ok(Self { flow_types: map })
    }

    pub fn get(&self, name: &str) -> Option<&FlowType> {
        self.flow_types.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.flow_types.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.flow_types.is_empty()
    }
}

fn validate_flow_type(flow: &FlowType) -> Result<(), String> {
    let mut names = HashSet::new();
    for template in &flow.tasks {
        if !names.insert(template.task_type.as_str()) {
            return Err(format!(
                "Flow type '{}' has duplicate task '{}'",
                flow.name, template.task_type
            ));
        }
    }

    for template in &flow.tasks {
        for dep in &template.depends_on {
            if dep == &template.task_type {
                return Err(format!(
                    "Flow type '{}': task '{}' depends on itself",
                    flow.name, template.task_type
                ));
            }
            if !names.contains(dep.as_str()) {
                return Err(format!(
                    "Flow type '{}': task '{}' depends on unknown task '{}'",
                    flow.name, template.task_type, dep
                ));
            }
        }
    }

    if let Some(cycle) = detect_template_cycle(flow) {
        return Err(format!(
            "Flow type '{}' has a dependency cycle: {}",
            flow.name,
            cycle.join(" -> ")
        ));
    }

    Ok(())
}

/// DFS-based cycle detection over the template dependency graph.
fn detect_template_cycle(flow: &FlowType) -> Option<Vec<String>> {
    let graph: HashMap<&str, Vec<&str>> = flow
        .tasks
        .iter()
        .map(|t| {
            (
                t.task_type.as_str(),
                t.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for &name in graph.keys() {
        if !visited.contains(name)
            && visit(name, &graph, &mut visited, &mut rec_stack, &mut path)
        {
            return Some(path.iter().map(|s| (*s).to_string()).collect());
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if visit(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                if let Some(start) = path.iter().position(|&n| n == neighbor) {
                    path.drain(0..start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_flow() -> FlowType {
        FlowType::new(
            "etl",
            vec![
                TaskTemplate::new("extract"),
                TaskTemplate::new("transform").with_depends_on(vec!["extract".to_string()]),
                TaskTemplate::new("load").with_depends_on(vec!["transform".to_string()]),
            ],
        )
    }

    #[test]
    fn test_registry_lookup() {
        let registry = FlowTypeRegistry::new(vec![linear_flow()]).unwrap();
        assert!(registry.get("etl").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_flow_type_rejected() {
        let result = FlowTypeRegistry::new(vec![linear_flow(), linear_flow()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_predecessor_rejected() {
        let flow = FlowType::new(
            "bad",
            vec![TaskTemplate::new("a").with_depends_on(vec!["ghost".to_string()])],
        );
        assert!(FlowTypeRegistry::new(vec![flow]).is_err());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let flow = FlowType::new(
            "bad",
            vec![TaskTemplate::new("a").with_depends_on(vec!["a".to_string()])],
        );
        assert!(FlowTypeRegistry::new(vec![flow]).is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let flow = FlowType::new(
            "bad",
            vec![
                TaskTemplate::new("a").with_depends_on(vec!["b".to_string()]),
                TaskTemplate::new("b").with_depends_on(vec!["a".to_string()]),
            ],
        );
        assert!(FlowTypeRegistry::new(vec![flow]).is_err());
    }

    #[test]
    fn test_forward_reference_allowed() {
        // Dependencies on templates declared later in the list are legal;
        // expansion records them as placeholder edges first.
        let flow = FlowType::new(
            "fanout",
            vec![
                TaskTemplate::new("finalize").with_depends_on(vec!["a".to_string(), "b".to_string()]),
                TaskTemplate::new("a"),
                TaskTemplate::new("b"),
            ],
        );
        assert!(FlowTypeRegistry::new(vec![flow]).is_ok());
    }
}
