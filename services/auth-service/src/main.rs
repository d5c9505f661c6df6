use mdstudio_auth_core::{Authorizer, RegistrationStats, TokenService};
use mdstudio_auth_service::component::AuthComponent;
use mdstudio_auth_service::dbwaiter::DBWaiter;
use mdstudio_auth_service::server::HealthServer;
use mdstudio_auth_service::stores::{InMemoryOAuthClientStore, InMemorySessionStore, InMemoryUserStore};
use mdstudio_router::InMemoryRouter;
use mdstudio_schema::{InMemorySchemaStore, SchemaValidator};
use mdstudio_session::SessionKernel;
use mdstudio_shared::health::HealthChecker;
use mdstudio_shared::{init_tracing, Config, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()
        .map_err(|e| mdstudio_shared::Error::Configuration(e.to_string()))?;
    init_tracing(&config.log_level)?;

    tracing::info!(realm = %config.realm, "starting mdstudio auth service");

    let router = Arc::new(InMemoryRouter::new());
    let token_service = Arc::new(TokenService::new(&config.jwt_secret));
    let schema_store = Arc::new(InMemorySchemaStore::new());
    let validator = Arc::new(SchemaValidator::new(schema_store));

    let mut ring0_acl: HashMap<String, Vec<String>> = HashMap::new();
    ring0_acl.insert("db".to_string(), vec!["mdstudio.db.endpoint.".to_string()]);
    ring0_acl.insert("schema".to_string(), vec!["mdstudio.schema.endpoint.".to_string()]);
    ring0_acl.insert("auth".to_string(), vec!["mdstudio.auth.endpoint.".to_string()]);
    ring0_acl.insert("logger".to_string(), vec!["mdstudio.logger.endpoint.".to_string()]);
    let registration_stats = Arc::new(RegistrationStats::new());
    let authorizer = Arc::new(Authorizer::new(ring0_acl).with_stats(registration_stats.clone()));

    let dbwaiter = Arc::new(DBWaiter::new(router.clone()));

    let auth_component = Arc::new(AuthComponent::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryOAuthClientStore::new()),
        token_service.clone(),
        authorizer,
        dbwaiter,
    ));

    auth_component
        .register_foundational(router.as_ref())
        .await
        .map_err(|e| mdstudio_shared::Error::Internal(e.to_string()))?;

    let kernel = SessionKernel::new(router, token_service, validator)
        .with_registration_stats(registration_stats);
    kernel
        .join(auth_component)
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
        "auth-kernel"
    }
}
