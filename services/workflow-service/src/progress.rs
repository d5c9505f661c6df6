//! Read-only progress snapshot computed from the live graph (§4.G Ambient:
//! "Monitoring/progress", matching the teacher's `WorkflowProgress` shape
//! in `monitoring.rs`, recomputed from the engine's own state rather than
//! polled from a Temporal server).

use crate::graph::{TaskStatus, WorkflowGraph};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow_id: String,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub failed_steps: u32,
    pub percentage: f32,
    pub current_steps: Vec<String>,
    pub is_running: bool,
    pub last_updated: DateTime<Utc>,
}

pub fn compute_progress(graph: &WorkflowGraph) -> WorkflowProgress {
    let total_steps = graph.nodes.len() as u32;
    let completed_steps = graph
        .nodes
        .values()
        .filter(|n| matches!(n.status, TaskStatus::Completed | TaskStatus::Disabled))
        .count() as u32;
    let failed_steps = graph
        .nodes
        .values()
        .filter(|n| n.status == TaskStatus::Failed)
        .count() as u32;
    let current_steps = graph
        .nodes
        .values()
        .filter(|n| n.active)
        .map(|n| n.id.clone())
        .collect();

    let percentage = if total_steps == 0 {
        0.0
    } else {
        (completed_steps as f32 / total_steps as f32) * 100.0
    };

    WorkflowProgress {
        workflow_id: graph.id.clone(),
        total_steps,
        completed_steps,
        failed_steps,
        percentage,
        current_steps,
        is_running: graph.is_running,
        last_updated: Utc::now(),
    }
}
