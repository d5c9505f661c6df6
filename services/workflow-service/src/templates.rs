//! Named, versioned graph blueprints a caller can instantiate by name
//! instead of posting a full DAG every time (§4.G Ambient: "Workflow
//! templates", mirroring the teacher's `WorkflowTemplateManager`/
//! `TemplateRegistry` split, trimmed to what this engine needs).

use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::{Edge, TaskNode, WorkflowGraph};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateNodeSpec {
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub continue_with_one: bool,
    #[serde(default)]
    pub breakpoint: bool,
    #[serde(default)]
    pub store_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEdgeSpec {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub data_select: Vec<String>,
    #[serde(default)]
    pub data_mapping: HashMap<String, String>,
}

/// A graph blueprint. `task_id`s may reference `{{parameter}}` placeholders
/// resolved against the caller-supplied parameter map at instantiation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub version: u32,
    pub root: String,
    pub nodes: Vec<TemplateNodeSpec>,
    pub edges: Vec<TemplateEdgeSpec>,
    pub parameters: Vec<String>,
}

fn substitute(task_id: &str, parameters: &HashMap<String, String>) -> String {
    let mut resolved = task_id.to_string();
    for (key, value) in parameters {
        resolved = resolved.replace(&format!("{{{{{key}}}}}"), value);
    }
    resolved
}

impl WorkflowTemplate {
    /// Materializes a fresh `WorkflowGraph` with every node in `ready`
    /// status, substituting `{{param}}` placeholders in each task_id.
    pub fn instantiate(&self, workflow_id: impl Into<String>, parameters: &HashMap<String, String>) -> WorkflowResult<WorkflowGraph> {
        for required in &self.parameters {
            if !parameters.contains_key(required) {
                return Err(WorkflowError::InvalidTemplate(format!("missing parameter: {required}")));
            }
        }

        let mut graph = WorkflowGraph::new(workflow_id, &self.root, Utc::now());
        for node in &self.nodes {
            let mut built = TaskNode::new(node.id.clone(), substitute(&node.task_id, parameters))
                .with_retry_count(node.retry_count)
                .with_breakpoint(node.breakpoint)
                .with_store_output(node.store_output);
            built.continue_with_one = node.continue_with_one;
            graph.add_node(built);
        }
        for edge in &self.edges {
            graph.add_edge(
                Edge::new(edge.parent.clone(), edge.child.clone())
                    .with_data_select(edge.data_select.clone())
                    .with_data_mapping(edge.data_mapping.clone()),
            );
        }
        Ok(graph)
    }
}

#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<(String, u32), WorkflowTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, template: WorkflowTemplate) {
        self.templates
            .write()
            .await
            .insert((template.name.clone(), template.version), template);
    }

    pub async fn get(&self, name: &str, version: Option<u32>) -> Option<WorkflowTemplate> {
        let templates = self.templates.read().await;
        match version {
            Some(v) => templates.get(&(name.to_string(), v)).cloned(),
            None => templates
                .values()
                .filter(|t| t.name == name)
                .max_by_key(|t| t.version)
                .cloned(),
        }
    }

    pub async fn list(&self) -> Vec<(String, u32)> {
        self.templates.read().await.keys().cloned().collect()
    }
}

pub fn parameters_from_json(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
