use mdstudio_auth_core::TokenService;
use mdstudio_router::InMemoryRouter;
use mdstudio_schema::{InMemorySchemaStore, SchemaValidator};
use mdstudio_session::SessionKernel;
use mdstudio_shared::health::HealthChecker;
use mdstudio_shared::{init_tracing, Config, Result};
use mdstudio_workflow_service::component::WorkflowComponent;
use mdstudio_workflow_service::management::WorkflowManager;
use mdstudio_workflow_service::runner::LocalRunner;
use mdstudio_workflow_service::server::HealthServer;
use mdstudio_workflow_service::templates::TemplateRegistry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()
        .map_err(|e| mdstudio_shared::Error::Configuration(e.to_string()))?;
    init_tracing(&config.log_level)?;

    tracing::info!(realm = %config.realm, "starting mdstudio workflow service");

    let router = Arc::new(InMemoryRouter::new());
    let token_service = Arc::new(TokenService::new(&config.jwt_secret));
    let schema_store = Arc::new(InMemorySchemaStore::new());
    let validator = Arc::new(SchemaValidator::new(schema_store));

    // No task handlers are registered out of the box; this binary is the
    // router-facing surface for a runner an operator wires up separately
    // (a `RemoteRunner` pointed at the component hosting the actual tasks).
    let runner = Arc::new(LocalRunner::new());
    let manager = Arc::new(WorkflowManager::new(runner, None));
    let templates = Arc::new(TemplateRegistry::new());
    let workflow_component = Arc::new(WorkflowComponent::new(manager, templates));

    let kernel = SessionKernel::new(router, token_service, validator);
    kernel
        .join(workflow_component)
        .await
        .map_err(|e| mdstudio_shared::Error::Internal(e.to_string()))?;

    let mut checker = HealthChecker::new(env!("CARGO_PKG_VERSION"));
    checker.add_check(KernelHealthCheck);
    let health_server = HealthServer::new(config.service_port, Arc::new(checker));
    health_server.run().await?;

    Ok(())
}

struct KernelHealthCheck;

#[async_trait::async_trait]
impl mdstudio_shared::health::HealthCheckProvider for KernelHealthCheck {
    async fn check(&self) -> Result<mdstudio_shared::types::HealthCheck> {
        Ok(mdstudio_shared::types::HealthCheck {
            status: "healthy".to_string(),
            message: None,
            duration_ms: 0,
        })
    }

    fn name(&self) -> &str {
        "workflow-kernel"
    }
}
