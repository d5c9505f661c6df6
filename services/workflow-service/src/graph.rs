//! The workflow DAG itself: task status machine, edges with data mapping,
//! and the input-collection algorithm (§4.G). No I/O lives here — the
//! engine in `engine.rs` is the only thing that mutates a graph while it
//! runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub type NodeId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ready,
    Running,
    Completed,
    Failed,
    Aborted,
    /// Out-of-band: never scheduled, counts as satisfied for `continue_with_one`.
    Disabled,
}

/// One vertex of the DAG. `task_id` names the handler a task runner
/// dispatches to (e.g. a remote RPC URI); `id` is the node's position in
/// this particular graph instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: NodeId,
    pub task_id: String,
    pub status: TaskStatus,
    pub active: bool,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub retry_count: u32,
    pub continue_with_one: bool,
    pub breakpoint: bool,
    pub store_output: bool,
    pub workdir: Option<String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            status: TaskStatus::Ready,
            active: false,
            input_data: Value::Object(Map::new()),
            output_data: None,
            retry_count: 0,
            continue_with_one: false,
            breakpoint: false,
            store_output: false,
            workdir: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_breakpoint(mut self, breakpoint: bool) -> Self {
        self.breakpoint = breakpoint;
        self
    }

    pub fn with_store_output(mut self, store_output: bool) -> Self {
        self.store_output = store_output;
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted | TaskStatus::Disabled
        )
    }
}

/// The directed edge `parent -> child`, carrying the projection/renaming
/// rule applied to the parent's output before it becomes part of the
/// child's `input_data` (§4.G "Input collection").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    /// Keys of the parent's output to carry forward. Empty means all keys.
    pub data_select: Vec<String>,
    /// Renames a selected key before it lands in the child's input.
    pub data_mapping: HashMap<String, String>,
}

impl Edge {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            data_select: Vec::new(),
            data_mapping: HashMap::new(),
        }
    }

    pub fn with_data_select(mut self, keys: Vec<String>) -> Self {
        self.data_select = keys;
        self
    }

    pub fn with_data_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.data_mapping = mapping;
        self
    }

    fn project(&self, output: &Value) -> Value {
        let Some(object) = output.as_object() else {
            return output.clone();
        };
        let mut projected = Map::new();
        let keys: Vec<&String> = if self.data_select.is_empty() {
            object.keys().collect()
        } else {
            self.data_select.iter().collect()
        };
        for key in keys {
            if let Some(value) = object.get(key) {
                let renamed = self.data_mapping.get(key).cloned().unwrap_or_else(|| key.clone());
                projected.insert(renamed, value.clone());
            }
        }
        Value::Object(projected)
    }
}

/// The JSON-serializable DAG: nodes, edges, and whether the engine
/// considers the instance still running (§4.G "Persistence").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub id: String,
    pub root: NodeId,
    pub nodes: HashMap<NodeId, TaskNode>,
    pub edges: Vec<Edge>,
    pub is_running: bool,
    pub root_workdir: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when a node with `breakpoint=true` just completed; the engine
    /// loop stops scheduling new work until `step_breakpoint` clears it.
    pub paused_at: Option<NodeId>,
}

impl WorkflowGraph {
    pub fn new(id: impl Into<String>, root: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            is_running: false,
            root_workdir: None,
            created_at,
            paused_at: None,
        }
    }

    pub fn add_node(&mut self, node: TaskNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn parents(&self, node: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| &e.child == node).collect()
    }

    pub fn children(&self, node: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| &e.parent == node).collect()
    }

    /// Whether any non-disabled task is `ready` (engine's termination test,
    /// §4.G: "stops once `is_running` becomes false and no non-disabled task
    /// is `ready`").
    pub fn has_ready_task(&self) -> bool {
        self.nodes
            .values()
            .any(|n| n.status == TaskStatus::Ready && self.parents_satisfied(&n.id))
    }

    pub fn has_active_task(&self) -> bool {
        self.nodes.values().any(|n| n.active)
    }

    fn parents_satisfied(&self, node: &NodeId) -> bool {
        let edges = self.parents(node);
        if edges.is_empty() {
            return true;
        }
        let task = &self.nodes[node];
        let satisfied = |parent: &NodeId| {
            self.nodes
                .get(parent)
                .map(|n| matches!(n.status, TaskStatus::Completed | TaskStatus::Disabled))
                .unwrap_or(false)
        };
        if task.continue_with_one {
            edges.iter().any(|e| satisfied(&e.parent))
        } else {
            edges.iter().all(|e| satisfied(&e.parent))
        }
    }

    /// Every node that is currently schedulable: `ready`, parents satisfied.
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.status == TaskStatus::Ready && self.parents_satisfied(&n.id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// §4.G "Input collection for a task T", steps 1-4. Returns `None` when
    /// nothing is available yet (defer, no state change).
    pub fn collect_input(&self, node: &NodeId) -> Option<Value> {
        let edges = self.parents(node);
        if edges.is_empty() {
            return Some(Value::Object(Map::new()));
        }

        let task = &self.nodes[node];
        let qualifying: Vec<&Edge> = edges
            .into_iter()
            .filter(|e| {
                self.nodes
                    .get(&e.parent)
                    .map(|n| matches!(n.status, TaskStatus::Completed | TaskStatus::Disabled))
                    .unwrap_or(false)
            })
            .collect();

        if task.continue_with_one && qualifying.is_empty() {
            return None;
        }
        if !task.continue_with_one && qualifying.len() < self.parents(node).len() {
            return None;
        }

        let mut merged = Map::new();
        for edge in qualifying {
            let Some(parent) = self.nodes.get(&edge.parent) else {
                continue;
            };
            let Some(output) = &parent.output_data else {
                continue;
            };
            if let Value::Object(projected) = edge.project(output) {
                merged.extend(projected);
            }
        }
        Some(Value::Object(merged))
    }

    pub fn requires_workdir(&self) -> bool {
        self.nodes.values().any(|n| n.store_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn diamond_merge_applies_selection_and_mapping() {
        let mut graph = WorkflowGraph::new("wf-1", "root", now());
        let mut root = TaskNode::new("root", "start");
        root.status = TaskStatus::Completed;
        root.output_data = Some(serde_json::json!({}));
        graph.add_node(root);

        let mut a = TaskNode::new("a", "task-a");
        a.status = TaskStatus::Completed;
        a.output_data = Some(serde_json::json!({"x": 1}));
        graph.add_node(a);

        let mut b = TaskNode::new("b", "task-b");
        b.status = TaskStatus::Completed;
        b.output_data = Some(serde_json::json!({"y": 2}));
        graph.add_node(b);

        graph.add_node(TaskNode::new("c", "task-c"));

        graph.add_edge(Edge::new("root", "a"));
        graph.add_edge(Edge::new("root", "b"));
        graph.add_edge(
            Edge::new("a", "c").with_data_mapping(HashMap::from([("x".to_string(), "p".to_string())])),
        );
        graph.add_edge(Edge::new("b", "c").with_data_select(vec!["y".to_string()]));

        let input = graph.collect_input(&"c".to_string()).unwrap();
        assert_eq!(input, serde_json::json!({"p": 1, "y": 2}));
    }

    #[test]
    fn continue_with_one_requires_only_a_single_qualifying_parent() {
        let mut graph = WorkflowGraph::new("wf-2", "root", now());
        let mut a = TaskNode::new("a", "task-a");
        a.status = TaskStatus::Failed;
        graph.add_node(a);

        let mut b = TaskNode::new("b", "task-b");
        b.status = TaskStatus::Completed;
        b.output_data = Some(serde_json::json!({"y": 2}));
        graph.add_node(b);

        let mut c = TaskNode::new("c", "task-c");
        c.continue_with_one = true;
        graph.add_node(c);

        graph.add_edge(Edge::new("a", "c"));
        graph.add_edge(Edge::new("b", "c"));

        assert_eq!(graph.collect_input(&"c".to_string()).unwrap(), serde_json::json!({"y": 2}));
    }

    #[test]
    fn missing_parent_output_defers_without_state_change() {
        let mut graph = WorkflowGraph::new("wf-3", "root", now());
        graph.add_node(TaskNode::new("a", "task-a"));
        graph.add_node(TaskNode::new("c", "task-c"));
        graph.add_edge(Edge::new("a", "c"));

        assert!(graph.collect_input(&"c".to_string()).is_none());
    }

    #[test]
    fn ready_nodes_wait_for_all_parents_by_default() {
        let mut graph = WorkflowGraph::new("wf-4", "root", now());
        let mut a = TaskNode::new("a", "task-a");
        a.status = TaskStatus::Completed;
        graph.add_node(a);
        graph.add_node(TaskNode::new("b", "task-b"));
        graph.add_node(TaskNode::new("c", "task-c"));
        graph.add_edge(Edge::new("a", "c"));
        graph.add_edge(Edge::new("b", "c"));

        assert!(!graph.ready_nodes().contains(&"c".to_string()));
    }
}
