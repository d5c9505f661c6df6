use crate::graph::WorkflowGraph;
use crate::management::WorkflowManager;
use crate::requests::{
    CancelWorkflowRequest, ListWorkflowsResponse, NewWorkflowRequest, ProgressRequest, RetryTaskRequest,
    StartWorkflowRequest, StatusRequest, StepBreakpointRequest,
};
use crate::templates::TemplateRegistry;
use async_trait::async_trait;
use chrono::Utc;
use mdstudio_session::{Component, EndpointFn, EndpointRegistration, HandlerError};
use serde_json::json;
use std::sync::Arc;

/// The workflow engine as a router component (§4.G's "itself such a
/// component"): its handlers mutate the shared graph registry and the
/// session kernel wraps every call in the usual verify/claims/authorize
/// pipeline like any other endpoint.
pub struct WorkflowComponent {
    manager: Arc<WorkflowManager>,
    templates: Arc<TemplateRegistry>,
}

impl WorkflowComponent {
    pub fn new(manager: Arc<WorkflowManager>, templates: Arc<TemplateRegistry>) -> Self {
        Self { manager, templates }
    }

    async fn build_graph(&self, request: NewWorkflowRequest) -> Result<WorkflowGraph, HandlerError> {
        if let Some(template_ref) = request.template {
            let template = self
                .templates
                .get(&template_ref.name, template_ref.version)
                .await
                .ok_or_else(|| HandlerError::Failed(format!("unknown template: {}", template_ref.name)))?;
            return template
                .instantiate(request.workflow_id, &template_ref.parameters)
                .map_err(|e| HandlerError::Failed(e.to_string()));
        }

        let root = request
            .root
            .ok_or_else(|| HandlerError::Failed("root is required when no template is given".to_string()))?;
        let mut graph = WorkflowGraph::new(request.workflow_id, root, Utc::now());
        for node in request.nodes {
            graph.add_node(node);
        }
        for edge in request.edges {
            graph.add_edge(edge);
        }
        Ok(graph)
    }

    fn new_endpoint(&self) -> EndpointRegistration {
        let this_manager = self.manager.clone();
        let this_templates = self.templates.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = this_manager.clone();
            let templates = this_templates.clone();
            Box::pin(async move {
                let request: NewWorkflowRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                let component = WorkflowComponent::new(manager, templates);
                let graph = component.build_graph(request).await?;
                let workflow_id = graph.id.clone();
                component
                    .manager
                    .start(graph)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                Ok(json!({ "workflow_id": workflow_id }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.new".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn start_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: StartWorkflowRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                let engine = manager
                    .get(&request.workflow_id)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                engine.run().await.map_err(|e| HandlerError::Failed(e.to_string()))?;
                Ok(json!({ "started": true }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.start".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn step_breakpoint_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: StepBreakpointRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                manager
                    .step_breakpoint(&request.workflow_id, &request.node_id)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                Ok(json!({ "resumed": true }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.step_breakpoint".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn cancel_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: CancelWorkflowRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                manager
                    .cancel(&request.workflow_id)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                Ok(json!({ "cancelled": true }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.cancel".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn status_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: StatusRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                let graph = manager
                    .status(&request.workflow_id)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                serde_json::to_value(graph).map_err(|e| HandlerError::Failed(e.to_string()))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.status".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn progress_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: ProgressRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                let progress = manager
                    .progress(&request.workflow_id)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                serde_json::to_value(progress).map_err(|e| HandlerError::Failed(e.to_string()))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.progress".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn retry_task_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let request: RetryTaskRequest =
                    serde_json::from_value(payload).map_err(|e| HandlerError::Failed(e.to_string()))?;
                manager
                    .retry_task(&request.workflow_id, &request.node_id, request.retry_count)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                Ok(json!({ "retried": true }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.retry_task".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn list_endpoint(&self) -> EndpointRegistration {
        let manager = self.manager.clone();
        let handler: EndpointFn = Arc::new(move |_payload, _claims| {
            let manager = manager.clone();
            Box::pin(async move {
                let workflow_ids = manager.list().await;
                serde_json::to_value(ListWorkflowsResponse { workflow_ids })
                    .map_err(|e| HandlerError::Failed(e.to_string()))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.workflow.endpoint.list".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }
}

#[async_trait]
impl Component for WorkflowComponent {
    fn name(&self) -> &str {
        "workflow"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["db".to_string(), "schema".to_string(), "auth".to_string()]
    }

    fn endpoints(&self) -> Vec<EndpointRegistration> {
        vec![
            self.new_endpoint(),
            self.start_endpoint(),
            self.step_breakpoint_endpoint(),
            self.cancel_endpoint(),
            self.status_endpoint(),
            self.progress_endpoint(),
            self.retry_task_endpoint(),
            self.list_endpoint(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, TaskNode};
    use crate::runner::LocalRunner;
    use mdstudio_shared::types::{Claims, ConnectionType};
    use serde_json::json;

    fn claims() -> Claims {
        Claims {
            username: "auth".to_string(),
            groups: vec!["mdstudio".to_string()],
            vendor: "mdstudio".to_string(),
            session_id: 1,
            expires_at: Utc::now(),
            connection_type: ConnectionType::User,
            access_token: None,
        }
    }

    fn build_component() -> WorkflowComponent {
        let mut runner = LocalRunner::new();
        runner.register("echo", |input| Box::pin(async move { Ok(input) }));
        let manager = Arc::new(WorkflowManager::new(Arc::new(runner), None));
        let templates = Arc::new(TemplateRegistry::new());
        WorkflowComponent::new(manager, templates)
    }

    #[tokio::test]
    async fn new_endpoint_starts_a_posted_graph_and_status_reports_completion() {
        let component = build_component();

        let new_handler = component.new_endpoint();
        let payload = json!({
            "workflow_id": "wf-post",
            "root": "a",
            "nodes": [TaskNode::new("a", "echo")],
            "edges": Vec::<Edge>::new(),
        });
        let response = (new_handler.handler)(payload, claims()).await.unwrap();
        assert_eq!(response["workflow_id"], "wf-post");

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let status_handler = component.status_endpoint();
        let status = (status_handler.handler)(json!({"workflow_id": "wf-post"}), claims()).await.unwrap();
        assert_eq!(status["nodes"]["a"]["status"], "completed");
    }

    #[tokio::test]
    async fn list_endpoint_reports_started_workflows() {
        let component = build_component();
        let mut graph = WorkflowGraph::new("wf-list", "a", Utc::now());
        graph.add_node(TaskNode::new("a", "echo"));
        component.manager.start(graph).await.unwrap();

        let list_handler = component.list_endpoint();
        let response = (list_handler.handler)(json!({}), claims()).await.unwrap();
        assert_eq!(response["workflow_ids"], json!(["wf-list"]));
    }
}
