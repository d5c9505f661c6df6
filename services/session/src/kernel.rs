use crate::component::Component;
use crate::registration::EndpointRegistration;
use crate::state::ComponentState;
use mdstudio_auth_core::{RegistrationStats, TokenService};
use mdstudio_router::{EndpointHandler, MatchPolicy, Router, RouterError};
use mdstudio_schema::SchemaValidator;
use mdstudio_shared::types::{ApiResult, Claims};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("router error: {0}")]
    Router(#[from] RouterError),
    #[error("timed out waiting for dependency {0} to come online")]
    DependencyTimeout(String),
}

/// Every claims token is checked against at least this shape before a
/// component's own `claim_schema` (if any) is merged in (§4.E: "default
/// MDStudioClaimSchema ⋃ endpoint's claim_schema").
fn default_claim_schema() -> Value {
    json!({
        "type": "object",
        "required": ["username", "groups", "vendor", "session_id", "connection_type"],
        "properties": {
            "username": { "type": "string" },
            "groups": { "type": "array" },
            "vendor": { "type": "string" },
            "session_id": { "type": "integer" },
            "connection_type": {},
        }
    })
}

const DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives a single component through the five-state lifecycle (§4.E) and
/// wraps its declared endpoints in the verify/claims/authorize/input/
/// output pipeline before registering them with the router.
pub struct SessionKernel {
    router: Arc<dyn Router>,
    token_service: Arc<TokenService>,
    validator: Arc<SchemaValidator>,
    state: RwLock<ComponentState>,
    registration_stats: Option<Arc<RegistrationStats>>,
}

impl SessionKernel {
    pub fn new(
        router: Arc<dyn Router>,
        token_service: Arc<TokenService>,
        validator: Arc<SchemaValidator>,
    ) -> Self {
        Self {
            router,
            token_service,
            validator,
            state: RwLock::new(ComponentState::Disconnected),
            registration_stats: None,
        }
    }

    /// Attaches the authorizer's registration-stats sink (§3) so every
    /// endpoint this kernel registers is recorded as a `(uri, match)` row.
    pub fn with_registration_stats(mut self, stats: Arc<RegistrationStats>) -> Self {
        self.registration_stats = Some(stats);
        self
    }

    pub async fn state(&self) -> ComponentState {
        *self.state.read().await
    }

    async fn transition(&self, next: ComponentState) {
        let mut state = self.state.write().await;
        debug_assert!(
            state.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            *state
        );
        *state = next;
    }

    #[instrument(skip(self, component), fields(component = component.name()))]
    pub async fn join(&self, component: Arc<dyn Component>) -> Result<(), KernelError> {
        self.transition(ComponentState::Connecting).await;
        // The router handshake itself lives at the transport layer the
        // `Router` trait abstracts over; reaching this point means it
        // already succeeded.
        self.transition(ComponentState::Joined).await;

        component.pre_init().await;

        self.transition(ComponentState::WaitingDeps).await;
        self.wait_for_dependencies(&component).await?;

        self.transition(ComponentState::Ready).await;
        component.on_init().await;

        for endpoint in component.endpoints() {
            self.register_endpoint(component.clone(), endpoint).await?;
        }

        self.transition(ComponentState::Running).await;
        component.on_run().await;

        self.router
            .publish(
                &format!("mdstudio.{}.endpoint.events.online", component.name()),
                json!({ "online": true }),
            )
            .await?;

        Ok(())
    }

    /// Any transport fault moves the component straight to `TEARDOWN`,
    /// matching the spec's "any transport fault → TEARDOWN → DISCONNECTED
    /// → CONNECTING" without this kernel owning the reconnect/backoff loop
    /// itself — that lives in whatever drives `join` again.
    pub async fn teardown(&self) {
        self.transition(ComponentState::Teardown).await;
        self.transition(ComponentState::Disconnected).await;
    }

    async fn wait_for_dependencies(&self, component: &Arc<dyn Component>) -> Result<(), KernelError> {
        for dependency in component.dependencies() {
            let topic = format!("mdstudio.{dependency}.endpoint.events.online");
            let mut receiver = self.router.subscribe(&topic).await;
            match timeout(DEPENDENCY_TIMEOUT, receiver.recv()).await {
                Ok(Ok(_)) => info!(dependency = %dependency, "dependency online"),
                Ok(Err(_)) => warn!(dependency = %dependency, "dependency announcement channel closed early"),
                Err(_) => return Err(KernelError::DependencyTimeout(dependency)),
            }
        }
        Ok(())
    }

    async fn register_endpoint(
        &self,
        component: Arc<dyn Component>,
        endpoint: EndpointRegistration,
    ) -> Result<(), KernelError> {
        let token_service = self.token_service.clone();
        let validator = self.validator.clone();
        let uri = endpoint.uri.clone();

        let handler: EndpointHandler = Arc::new(move |token, payload| {
            let token_service = token_service.clone();
            let validator = validator.clone();
            let component = component.clone();
            let endpoint = endpoint.clone();
            Box::pin(async move {
                Ok(handle_call(&token_service, &validator, component.as_ref(), &endpoint, token, payload).await)
            })
        });

        self.router.register(&uri, MatchPolicy::Exact, handler).await?;
        if let Some(stats) = &self.registration_stats {
            stats.record_registration(&uri, MatchPolicy::Exact).await;
        }
        Ok(())
    }
}

/// The per-call pipeline from §4.E, steps 1-7. Every outcome — including
/// rejection at any step — is returned as `Ok(envelope)`; a `RouterError`
/// is reserved for actual transport failures the router itself hits.
async fn handle_call(
    token_service: &TokenService,
    validator: &SchemaValidator,
    component: &dyn Component,
    endpoint: &EndpointRegistration,
    token: Option<String>,
    payload: Value,
) -> Value {
    let envelope = |result: ApiResult<Value>| serde_json::to_value(result).expect("ApiResult always serializes");

    // 1. verify(token)
    let claims = match &token {
        Some(token) => match token_service.verify(token) {
            ApiResult::Result { result } => result,
            ApiResult::Error { error } => return envelope(ApiResult::error(error)),
            ApiResult::Expired { expired } => return envelope(ApiResult::expired(expired)),
            ApiResult::ResultWithWarning { result, .. } => result,
        },
        None => return envelope(ApiResult::error("missing bearer token")),
    };

    // 2. validate claims against default ⋃ endpoint claim_schema
    let mut claim_schema = default_claim_schema();
    if let Some(reference) = &endpoint.claim_schema {
        match validator.resolve_schema_body(reference).await {
            Ok(extra) => claim_schema = json!({ "allOf": [claim_schema, extra] }),
            Err(err) => return envelope(ApiResult::error(format!("claim schema unresolvable: {err}"))),
        }
    }
    let claims_value = serde_json::to_value(&claims).unwrap_or(Value::Null);
    if let Err(err) = validator.validate_body(&claim_schema, &claims_value).await {
        return envelope(ApiResult::error(format!("claims rejected: {err}")));
    }

    // 3. component-level authorization
    if !component.authorize_request(&endpoint.uri, &claims) {
        return envelope(ApiResult::error("unauthorized"));
    }

    // 4. validate request body
    if let Some(input_schema) = &endpoint.input_schema {
        if let Err(err) = validator.validate(input_schema, &payload).await {
            return envelope(ApiResult::error(format!("invalid input: {err}")));
        }
    }

    // 5. invoke the user handler
    let result = match (endpoint.handler)(payload, claims).await {
        Ok(value) => value,
        Err(err) => return envelope(ApiResult::error(err.to_string())),
    };

    // 6. validate the result; a mismatch is a warning, not an error
    if let Some(output_schema) = &endpoint.output_schema {
        if let Err(err) = validator.validate(output_schema, &result).await {
            return envelope(ApiResult::ok_with_warning(
                result,
                format!("output did not match schema: {err}"),
            ));
        }
    }

    // 7. serialize the envelope
    envelope(ApiResult::ok(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::HandlerError;
    use mdstudio_router::InMemoryRouter;
    use mdstudio_schema::{InMemorySchemaStore, SchemaType};
    use mdstudio_shared::types::ConnectionType;

    struct EchoComponent {
        endpoints: Vec<EndpointRegistration>,
    }

    impl Component for EchoComponent {
        fn name(&self) -> &str {
            "echo"
        }

        fn endpoints(&self) -> Vec<EndpointRegistration> {
            self.endpoints.clone()
        }
    }

    fn setup() -> (Arc<InMemoryRouter>, Arc<TokenService>, Arc<SchemaValidator>) {
        let router = Arc::new(InMemoryRouter::new());
        let token_service = Arc::new(TokenService::new("secret"));
        let store = Arc::new(InMemorySchemaStore::new());
        let validator = Arc::new(SchemaValidator::new(store));
        (router, token_service, validator)
    }

    fn sample_claims() -> Claims {
        Claims {
            username: "auth".to_string(),
            groups: vec!["mdstudio".to_string()],
            vendor: "mdstudio".to_string(),
            session_id: 1,
            expires_at: chrono::Utc::now(),
            connection_type: ConnectionType::User,
            access_token: None,
        }
    }

    #[tokio::test]
    async fn joining_drives_a_mocked_component_through_its_lifecycle_hooks() {
        use crate::component::MockComponent;

        let (router, token_service, validator) = setup();
        let handler: crate::registration::EndpointFn =
            Arc::new(|payload, _claims| Box::pin(async move { Ok(payload) }));

        let mut mock = MockComponent::new();
        mock.expect_name().return_const("mocked".to_string());
        mock.expect_dependencies().return_const(Vec::<String>::new());
        mock.expect_pre_init().times(1).return_const(());
        mock.expect_on_init().times(1).return_const(());
        mock.expect_on_run().times(1).return_const(());
        mock.expect_authorize_request().returning(|_, _| true);
        mock.expect_endpoints().return_const(vec![EndpointRegistration {
            uri: "mdstudio.mocked.endpoint.ping".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }]);

        let kernel = SessionKernel::new(router.clone(), token_service.clone(), validator);
        kernel.join(Arc::new(mock)).await.unwrap();
        assert_eq!(kernel.state().await, ComponentState::Running);

        let token = token_service.sign(sample_claims(), "auth").unwrap();
        let (response, _) = router
            .call("mdstudio.mocked.endpoint.ping", Some(token), json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(response["kind"], "result");
    }

    #[tokio::test]
    async fn joining_records_registration_stats_when_attached() {
        let (router, token_service, validator) = setup();
        let handler: crate::registration::EndpointFn = Arc::new(|payload, _claims| {
            Box::pin(async move { Ok(payload) })
        });
        let component = Arc::new(EchoComponent {
            endpoints: vec![EndpointRegistration {
                uri: "mdstudio.echo.endpoint.ping".to_string(),
                input_schema: None,
                output_schema: None,
                claim_schema: None,
                scope: None,
                handler,
            }],
        });

        let stats = Arc::new(RegistrationStats::new());
        let kernel = SessionKernel::new(router, token_service, validator)
            .with_registration_stats(stats.clone());
        kernel.join(component).await.unwrap();

        assert_eq!(
            stats
                .registration_count("mdstudio.echo.endpoint.ping", MatchPolicy::Exact)
                .await,
            1
        );
    }

    #[tokio::test]
    async fn joining_registers_endpoint_and_accepts_valid_calls() {
        let (router, token_service, validator) = setup();
        let handler: crate::registration::EndpointFn = Arc::new(|payload, _claims| {
            Box::pin(async move { Ok(payload) })
        });
        let component = Arc::new(EchoComponent {
            endpoints: vec![EndpointRegistration {
                uri: "mdstudio.echo.endpoint.ping".to_string(),
                input_schema: None,
                output_schema: None,
                claim_schema: None,
                scope: None,
                handler,
            }],
        });

        let kernel = SessionKernel::new(router.clone(), token_service.clone(), validator);
        kernel.join(component).await.unwrap();
        assert_eq!(kernel.state().await, ComponentState::Running);

        let token = token_service.sign(sample_claims(), "auth").unwrap();
        let (response, _) = router
            .call("mdstudio.echo.endpoint.ping", Some(token), json!({"hello": "world"}))
            .await
            .unwrap();

        assert_eq!(response["kind"], "result");
        assert_eq!(response["result"], json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn missing_token_is_rejected_before_invoking_handler() {
        let (router, token_service, validator) = setup();
        let handler: crate::registration::EndpointFn =
            Arc::new(|_payload, _claims| Box::pin(async move { Err(HandlerError::Failed("should not run".into())) }));
        let component = Arc::new(EchoComponent {
            endpoints: vec![EndpointRegistration {
                uri: "mdstudio.echo.endpoint.ping".to_string(),
                input_schema: None,
                output_schema: None,
                claim_schema: None,
                scope: None,
                handler,
            }],
        });

        let kernel = SessionKernel::new(router.clone(), token_service, validator);
        kernel.join(component).await.unwrap();

        let (response, _) = router
            .call("mdstudio.echo.endpoint.ping", None, json!({}))
            .await
            .unwrap();

        assert_eq!(response["kind"], "error");
    }

    #[tokio::test]
    async fn component_authorization_false_short_circuits() {
        struct DenyingComponent(Vec<EndpointRegistration>);
        impl Component for DenyingComponent {
            fn name(&self) -> &str {
                "denier"
            }
            fn authorize_request(&self, _uri: &str, _claims: &Claims) -> bool {
                false
            }
            fn endpoints(&self) -> Vec<EndpointRegistration> {
                self.0.clone()
            }
        }

        let (router, token_service, validator) = setup();
        let handler: crate::registration::EndpointFn =
            Arc::new(|_payload, _claims| Box::pin(async move { Err(HandlerError::Failed("should not run".into())) }));
        let component = Arc::new(DenyingComponent(vec![EndpointRegistration {
            uri: "mdstudio.denier.endpoint.ping".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }]));

        let kernel = SessionKernel::new(router.clone(), token_service.clone(), validator);
        kernel.join(component).await.unwrap();

        let token = token_service.sign(sample_claims(), "auth").unwrap();
        let (response, _) = router
            .call("mdstudio.denier.endpoint.ping", Some(token), json!({}))
            .await
            .unwrap();

        assert_eq!(response["kind"], "error");
        assert_eq!(response["error"], "unauthorized");
    }

    #[tokio::test]
    async fn output_schema_mismatch_becomes_warning_not_error() {
        let (router, token_service, validator_store_handle) = {
            let router = Arc::new(InMemoryRouter::new());
            let token_service = Arc::new(TokenService::new("secret"));
            let store = Arc::new(InMemorySchemaStore::new());
            store
                .upsert(
                    "mdstudio",
                    "echo",
                    SchemaType::Endpoint,
                    "ping.output",
                    json!({"type": "object", "required": ["ok"]}),
                    "alice",
                )
                .await;
            (router, token_service, Arc::new(SchemaValidator::new(store)))
        };

        let handler: crate::registration::EndpointFn =
            Arc::new(|_payload, _claims| Box::pin(async move { Ok(json!({"not_ok": true})) }));
        let component = Arc::new(EchoComponent {
            endpoints: vec![EndpointRegistration {
                uri: "mdstudio.echo.endpoint.ping".to_string(),
                input_schema: None,
                output_schema: Some("endpoint://mdstudio/echo/ping.output".to_string()),
                claim_schema: None,
                scope: None,
                handler,
            }],
        });

        let kernel = SessionKernel::new(router.clone(), token_service.clone(), validator_store_handle);
        kernel.join(component).await.unwrap();

        let token = token_service.sign(sample_claims(), "auth").unwrap();
        let (response, _) = router
            .call("mdstudio.echo.endpoint.ping", Some(token), json!({}))
            .await
            .unwrap();

        assert_eq!(response["kind"], "result_with_warning");
        assert_eq!(response["result"], json!({"not_ok": true}));
    }
}
