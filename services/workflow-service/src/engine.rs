//! Drives a single `WorkflowGraph` through its task-status machine (§4.G).
//! A `WorkflowEngine` owns one background executor task (§5: "spawns one
//! background executor task ... that performs task dispatch so the
//! HTTP-facing handlers stay responsive"); everything else — the query
//! endpoints in `component.rs` and `management.rs` — only ever takes a
//! `.read().await` snapshot of the shared graph, never mutates it directly.

use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::{NodeId, TaskStatus, WorkflowGraph};
use crate::runner::{RunnerError, TaskRunner};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// One task's dispatch outcome, delivered to the executor loop over the
/// completion channel instead of the loop awaiting the dispatch inline —
/// this is what keeps one slow task from blocking scheduling of the rest
/// of the graph.
struct Completion {
    node: NodeId,
    outcome: Result<serde_json::Value, RunnerError>,
}

pub struct WorkflowEngine {
    pub graph: Arc<RwLock<WorkflowGraph>>,
    runner: Arc<dyn TaskRunner>,
    root_workdir: Option<String>,
    active_cancels: Arc<RwLock<HashMap<NodeId, CancellationToken>>>,
    executor: RwLock<Option<JoinHandle<()>>>,
    completions_tx: RwLock<mpsc::UnboundedSender<Completion>>,
    completions_rx: RwLock<Option<mpsc::UnboundedReceiver<Completion>>>,
}

impl WorkflowEngine {
    pub fn new(graph: WorkflowGraph, runner: Arc<dyn TaskRunner>, root_workdir: Option<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            graph: Arc::new(RwLock::new(graph)),
            runner,
            root_workdir,
            active_cancels: Arc::new(RwLock::new(HashMap::new())),
            executor: RwLock::new(None),
            completions_tx: RwLock::new(tx),
            completions_rx: RwLock::new(Some(rx)),
        }
    }

    pub async fn id(&self) -> String {
        self.graph.read().await.id.clone()
    }

    pub async fn snapshot(&self) -> WorkflowGraph {
        self.graph.read().await.clone()
    }

    /// Starts (or resumes) the background executor task. Re-entrant:
    /// calling `run` on an already-running engine is a no-op, matching
    /// §4.G "can be stopped at any time and resumed by re-entering `run`".
    #[instrument(skip(self), fields(workflow_id = %self.id().await))]
    pub async fn run(self: &Arc<Self>) -> WorkflowResult<()> {
        {
            let mut executor = self.executor.write().await;
            if executor.as_ref().is_some_and(|h| !h.is_finished()) {
                return Ok(());
            }
            let mut graph = self.graph.write().await;
            if graph.requires_workdir() && self.root_workdir.is_none() && graph.root_workdir.is_none() {
                return Err(WorkflowError::InvalidOperation(
                    "workflow has store_output tasks but no root workdir was configured".to_string(),
                ));
            }
            graph.is_running = true;
            if let Some(root) = &self.root_workdir {
                graph.root_workdir = Some(root.clone());
            }
            drop(graph);

            let rx = {
                let mut rx_slot = self.completions_rx.write().await;
                match rx_slot.take() {
                    Some(rx) => rx,
                    None => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        *self.completions_tx.write().await = tx;
                        rx
                    }
                }
            };

            let engine = self.clone();
            *executor = Some(tokio::spawn(async move { engine.executor_loop(rx).await }));
        }
        Ok(())
    }

    async fn executor_loop(self: Arc<Self>, mut completions: mpsc::UnboundedReceiver<Completion>) {
        self.dispatch_ready().await;
        loop {
            let still_running = {
                let graph = self.graph.read().await;
                graph.is_running && (graph.has_ready_task() || graph.has_active_task())
            };
            if !still_running {
                break;
            }

            match completions.recv().await {
                Some(completion) => {
                    self.apply_completion(completion).await;
                    self.dispatch_ready().await;
                }
                None => break,
            }
        }
    }

    /// Dispatches every currently-schedulable node whose input is available
    /// (§4.G steps `ready -> running`). Nodes whose input isn't ready yet
    /// are left `ready` and retried on the next loop iteration (§4.G "log
    /// and defer").
    async fn dispatch_ready(&self) {
        let (paused, candidates, workdir_template) = {
            let graph = self.graph.read().await;
            (graph.paused_at.clone(), graph.ready_nodes(), graph.root_workdir.clone())
        };
        if paused.is_some() {
            return;
        }

        for node_id in candidates {
            let input = {
                let graph = self.graph.read().await;
                graph.collect_input(&node_id)
            };
            let Some(input) = input else {
                info!(node = %node_id, "input not yet available, deferring");
                continue;
            };

            let (task_id, store_output) = {
                let mut graph = self.graph.write().await;
                let Some(node) = graph.nodes.get_mut(&node_id) else {
                    continue;
                };
                node.status = TaskStatus::Running;
                node.active = true;
                node.input_data = input.clone();
                (node.task_id.clone(), node.store_output)
            };

            if store_output {
                let dir = format!(
                    "{}/task-{}-{}",
                    workdir_template.clone().unwrap_or_default(),
                    node_id,
                    task_id
                );
                if let Err(err) = tokio::fs::create_dir_all(&dir).await {
                    warn!(node = %node_id, error = %err, "failed to create task workdir");
                }
                let mut graph = self.graph.write().await;
                if let Some(node) = graph.nodes.get_mut(&node_id) {
                    node.workdir = Some(dir);
                }
            }

            let token = CancellationToken::new();
            self.active_cancels.write().await.insert(node_id.clone(), token.clone());

            let runner = self.runner.clone();
            let tx = self.completions_tx.read().await.clone();
            let node_for_task = node_id.clone();
            tokio::spawn(async move {
                let outcome = runner.run(&task_id, input, token).await;
                let outcome = match outcome {
                    Ok(value) if value.is_null() => Err(RunnerError::NoPayload),
                    other => other,
                };
                let _ = tx.send(Completion { node: node_for_task, outcome });
            });
        }
    }

    async fn apply_completion(&self, completion: Completion) {
        self.active_cancels.write().await.remove(&completion.node);

        let mut graph = self.graph.write().await;
        let breakpoint = {
            let Some(node) = graph.nodes.get_mut(&completion.node) else {
                return;
            };
            node.active = false;
            // `cancel()` may have already forced this node to `aborted`
            // while the dispatch was in flight; an in-flight outcome
            // arriving afterwards must not resurrect it.
            if node.status == TaskStatus::Aborted {
                return;
            }
            match completion.outcome {
                Ok(output) => {
                    node.status = TaskStatus::Completed;
                    node.output_data = Some(output);
                    node.breakpoint
                }
                Err(_) if node.retry_count > 0 => {
                    node.retry_count -= 1;
                    node.status = TaskStatus::Ready;
                    false
                }
                Err(_) => {
                    node.status = TaskStatus::Failed;
                    false
                }
            }
        };

        if breakpoint {
            graph.paused_at = Some(completion.node.clone());
            info!(node = %completion.node, "workflow suspended at breakpoint");
        }

        if !graph.has_ready_task() && !graph.has_active_task() {
            graph.is_running = false;
        }
    }

    /// §4.G "step_breakpoint(tid) clears the flag and resumes".
    pub async fn step_breakpoint(&self, node_id: &str) -> WorkflowResult<()> {
        let mut graph = self.graph.write().await;
        let node = graph
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
        node.breakpoint = false;
        let was_paused_here = graph.paused_at.as_deref() == Some(node_id);
        if was_paused_here {
            graph.paused_at = None;
        }
        drop(graph);

        if was_paused_here {
            self.dispatch_ready().await;
        }
        Ok(())
    }

    /// "Anywhere -> aborted", walking every active task and invoking its
    /// cancellation token (§4.G).
    pub async fn cancel(&self) {
        let cancels = self.active_cancels.write().await;
        for token in cancels.values() {
            token.cancel();
        }
        drop(cancels);

        let mut graph = self.graph.write().await;
        for node in graph.nodes.values_mut() {
            if node.active || node.status == TaskStatus::Ready {
                node.status = TaskStatus::Aborted;
                node.active = false;
            }
        }
        graph.is_running = false;
        graph.paused_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, TaskNode};
    use crate::runner::LocalRunner;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn graph_with_single_task(retry_count: u32) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new("wf", "a", Utc::now());
        graph.add_node(TaskNode::new("a", "task-a").with_retry_count(retry_count));
        graph
    }

    #[tokio::test]
    async fn single_task_completes_and_stops_the_engine() {
        let mut runner = LocalRunner::new();
        runner.register("task-a", |_input| Box::pin(async move { Ok(json!({"ok": true})) }));

        let engine = Arc::new(WorkflowEngine::new(graph_with_single_task(0), Arc::new(runner), None));
        engine.run().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = engine.snapshot().await;
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.nodes["a"].status, TaskStatus::Completed);
        assert_eq!(snapshot.nodes["a"].output_data, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn retry_budget_is_exhausted_before_failing() {
        let mut runner = LocalRunner::new();
        runner.register("task-a", |_input| Box::pin(async move { Err(RunnerError::Transport("boom".into())) }));

        let engine = Arc::new(WorkflowEngine::new(graph_with_single_task(2), Arc::new(runner), None));
        engine.run().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.nodes["a"].status, TaskStatus::Failed);
        assert_eq!(snapshot.nodes["a"].retry_count, 0);
        assert!(!snapshot.is_running);
    }

    #[tokio::test]
    async fn diamond_graph_runs_to_completion_with_merged_input() {
        let mut runner = LocalRunner::new();
        runner.register("start", |_input| Box::pin(async move { Ok(json!({})) }));
        runner.register("a", |_input| Box::pin(async move { Ok(json!({"x": 1})) }));
        runner.register("b", |_input| Box::pin(async move { Ok(json!({"y": 2})) }));
        runner.register("c", |input| Box::pin(async move { Ok(input) }));

        let mut graph = WorkflowGraph::new("wf-diamond", "root", Utc::now());
        graph.add_node(TaskNode::new("root", "start"));
        graph.add_node(TaskNode::new("a", "a"));
        graph.add_node(TaskNode::new("b", "b"));
        graph.add_node(TaskNode::new("c", "c"));
        graph.add_edge(Edge::new("root", "a"));
        graph.add_edge(Edge::new("root", "b"));
        graph.add_edge(
            Edge::new("a", "c").with_data_mapping(HashMap::from([("x".to_string(), "p".to_string())])),
        );
        graph.add_edge(Edge::new("b", "c").with_data_select(vec!["y".to_string()]));

        let engine = Arc::new(WorkflowEngine::new(graph, Arc::new(runner), None));
        engine.run().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.nodes["c"].status, TaskStatus::Completed);
        assert_eq!(snapshot.nodes["c"].input_data, json!({"p": 1, "y": 2}));
    }

    #[tokio::test]
    async fn breakpoint_suspends_until_step_breakpoint_is_called() {
        let mut runner = LocalRunner::new();
        runner.register("a", |_input| Box::pin(async move { Ok(json!({"done": true})) }));
        runner.register("b", |_input| Box::pin(async move { Ok(json!({"final": true})) }));

        let mut graph = WorkflowGraph::new("wf-bp", "a", Utc::now());
        graph.add_node(TaskNode::new("a", "a").with_breakpoint(true));
        graph.add_node(TaskNode::new("b", "b"));
        graph.add_edge(Edge::new("a", "b"));

        let engine = Arc::new(WorkflowEngine::new(graph, Arc::new(runner), None));
        engine.run().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.nodes["a"].status, TaskStatus::Completed);
        assert_eq!(snapshot.nodes["b"].status, TaskStatus::Ready);
        assert_eq!(snapshot.paused_at, Some("a".to_string()));

        engine.step_breakpoint("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.nodes["b"].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_aborts_active_tasks() {
        let mut runner = LocalRunner::new();
        runner.register("slow", |_input| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!({}))
            })
        });

        let mut graph = WorkflowGraph::new("wf-cancel", "a", Utc::now());
        graph.add_node(TaskNode::new("a", "slow"));

        let engine = Arc::new(WorkflowEngine::new(graph, Arc::new(runner), None));
        engine.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine.cancel().await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.nodes["a"].status, TaskStatus::Aborted);
        assert!(!snapshot.is_running);
    }
}
