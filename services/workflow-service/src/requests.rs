use crate::graph::{Edge, TaskNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Posting a raw graph directly, as an alternative to instantiating a
/// named template (`…workflow.endpoint.new`).
#[derive(Debug, Deserialize)]
pub struct NewWorkflowRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub nodes: Vec<TaskNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub template: Option<TemplateRef>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub version: Option<u32>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    pub workflow_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StepBreakpointRequest {
    pub workflow_id: String,
    pub node_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelWorkflowRequest {
    pub workflow_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub workflow_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub workflow_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RetryTaskRequest {
    pub workflow_id: String,
    pub node_id: String,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ListWorkflowsResponse {
    pub workflow_ids: Vec<String>,
}
