use crate::dbwaiter::DBWaiter;
use crate::requests::{
    AuthorizeRequest, AuthorizeResponse, LoginRequest, LoginResponse, LogoutRequest,
    OAuthClientCreateRequest, OAuthClientGetUsernameRequest, SignRequest, VerifyRequest,
};
use crate::stores::{OAuthClientStore, Session, SessionStore, User, UserStore};
use async_trait::async_trait;
use mdstudio_auth_core::{Action, AuthorizationDecision, AuthorizationRequest, Authorizer, TokenService};
use mdstudio_router::{EndpointHandler, MatchPolicy, Router, RouterError};
use mdstudio_session::{Component, EndpointFn, EndpointRegistration, HandlerError};
use mdstudio_shared::types::{ApiResult, Claims, ConnectionType};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Collects components A-D behind the router-facing endpoints described in
/// §4.F. `login`/`logout`/`sign`/`verify`/`authorize.*` bootstrap the
/// claims pipeline itself, so they are registered directly with the router
/// rather than through the session kernel's own verify/authorize wrapper —
/// a token-verification endpoint cannot require a pre-verified token to
/// call it without becoming circular. `oauth.client.*` are ordinary
/// authenticated endpoints and go through the kernel like any other
/// component's.
pub struct AuthComponent {
    pub user_store: Arc<dyn UserStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub oauth_store: Arc<dyn OAuthClientStore>,
    pub token_service: Arc<TokenService>,
    pub authorizer: Arc<Authorizer>,
    pub dbwaiter: Arc<DBWaiter>,
    pub domain_blacklist: Vec<String>,
    pub localhost_only: bool,
    next_session_id: AtomicI64,
}

impl AuthComponent {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        session_store: Arc<dyn SessionStore>,
        oauth_store: Arc<dyn OAuthClientStore>,
        token_service: Arc<TokenService>,
        authorizer: Arc<Authorizer>,
        dbwaiter: Arc<DBWaiter>,
    ) -> Self {
        Self {
            user_store,
            session_store,
            oauth_store,
            token_service,
            authorizer,
            dbwaiter,
            domain_blacklist: Vec::new(),
            localhost_only: false,
            next_session_id: AtomicI64::new(1),
        }
    }

    pub fn with_domain_blacklist(mut self, blacklist: Vec<String>) -> Self {
        self.domain_blacklist = blacklist;
        self
    }

    pub fn with_localhost_only(mut self, localhost_only: bool) -> Self {
        self.localhost_only = localhost_only;
        self
    }

    /// §4.F: "enforces domain blacklist + optional localhost-only". A
    /// bare `authid` with no `@domain` part has no domain to check and is
    /// always allowed through this gate.
    fn domain_allowed(&self, authid: &str) -> bool {
        match authid.split_once('@') {
            Some((_, domain)) => {
                if self.localhost_only && domain != "localhost" {
                    return false;
                }
                !self.domain_blacklist.iter().any(|d| d == domain)
            }
            None => true,
        }
    }

    async fn handle_login(&self, request: LoginRequest) -> ApiResult<LoginResponse> {
        if !self.domain_allowed(&request.authid) {
            return ApiResult::error("domain is not permitted to authenticate");
        }

        if let Some(user) = self.user_store.find(&request.authid).await {
            return self.login_as_user(&request, user).await;
        }

        if let Some(client) = self.oauth_store.find(&request.authid).await {
            return self.login_as_oauth_client(&request, client).await;
        }

        ApiResult::error("unknown authid")
    }

    async fn login_as_user(&self, request: &LoginRequest, user: User) -> ApiResult<LoginResponse> {
        match request.authmethod.as_str() {
            "ticket" => {
                let Some(ticket) = &request.ticket else {
                    return ApiResult::error("ticket authmethod requires a ticket");
                };
                match mdstudio_shared::auth::verify_password(ticket, &user.password_hash) {
                    Ok(true) => self.finish_login(request, &user.authid, &user.role, json!({})).await,
                    Ok(false) => ApiResult::error("invalid credentials"),
                    Err(err) => ApiResult::error(format!("credential check failed: {err}")),
                }
            }
            "wampcra" => match &user.secret {
                Some(secret) => {
                    let mut response = match self
                        .finish_login(request, &user.authid, &user.role, json!({}))
                        .await
                    {
                        ApiResult::Result { result } => result,
                        other => return other,
                    };
                    response.secret = Some(secret.clone());
                    ApiResult::ok(response)
                }
                None => ApiResult::error("account has no wampcra secret configured"),
            },
            other => ApiResult::error(format!("unsupported authmethod: {other}")),
        }
    }

    async fn login_as_oauth_client(
        &self,
        request: &LoginRequest,
        client: crate::stores::OAuthClient,
    ) -> ApiResult<LoginResponse> {
        if request.authmethod != "ticket" {
            return ApiResult::error("oauth clients only support ticket authmethod");
        }
        let Some(ticket) = &request.ticket else {
            return ApiResult::error("ticket authmethod requires a ticket");
        };
        if ticket != &client.client_secret {
            return ApiResult::error("invalid client credentials");
        }

        let claims = Claims {
            username: client.client_id.clone(),
            groups: client.scopes.clone(),
            vendor: "mdstudio".to_string(),
            session_id: self.next_session_id.fetch_add(1, Ordering::SeqCst),
            expires_at: chrono::Utc::now() + chrono::Duration::minutes(5),
            connection_type: ConnectionType::Group,
            access_token: None,
        };
        let token = match self.token_service.sign(claims, "auth") {
            Ok(token) => token,
            Err(err) => return ApiResult::error(format!("token issuance failed: {err}")),
        };

        self.finish_login(request, &client.client_id, "oauth-client", json!({ "access_token": token }))
            .await
    }

    async fn finish_login(
        &self,
        request: &LoginRequest,
        authid: &str,
        role: &str,
        extra: Value,
    ) -> ApiResult<LoginResponse> {
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Session {
            user_id: authid.to_string(),
            session_id,
            realm: request.realm.clone(),
            role: role.to_string(),
            extra: extra.clone(),
        };

        let session_store = self.session_store.clone();
        self.dbwaiter
            .run_when_ready(move || async move { session_store.create(session).await })
            .await;

        ApiResult::ok(LoginResponse {
            realm: request.realm.clone(),
            role: role.to_string(),
            extra,
            secret: None,
        })
    }

    async fn handle_logout(&self, request: LogoutRequest) -> ApiResult<Value> {
        let session_store = self.session_store.clone();
        let user_id = request.user_id.clone();
        self.dbwaiter
            .run_when_ready(move || async move { session_store.delete(&user_id, request.session_id).await })
            .await;
        ApiResult::ok(json!({ "deleted": true }))
    }

    fn handle_authorize(&self, request: AuthorizeRequest, ring: &str) -> AuthorizationDecision {
        let action = match request.action.as_str() {
            "subscribe" => Action::Subscribe,
            "publish" => Action::Publish,
            _ => Action::Call,
        };
        let authz_request = AuthorizationRequest {
            realm: &request.realm,
            authid: &request.authid,
            uri: &request.uri,
            action,
        };
        match ring {
            "admin" => self.authorizer.authorize_admin(&authz_request),
            "ring0" => self.authorizer.authorize_ring0(&authz_request),
            "user" => self.authorizer.authorize_user(&authz_request),
            "public" => self.authorizer.authorize_public(&authz_request),
            _ => AuthorizationDecision::deny(),
        }
    }

    /// Registers the bootstrapping endpoints (login, logout, sign, verify,
    /// authorize.*) directly with the router, outside the session kernel's
    /// claims pipeline.
    pub async fn register_foundational(self: &Arc<Self>, router: &dyn Router) -> Result<(), RouterError> {
        self.register_login(router).await?;
        self.register_logout(router).await?;
        self.register_sign(router).await?;
        self.register_verify(router).await?;
        for ring in ["admin", "ring0", "oauth", "user", "public"] {
            self.register_authorize(router, ring).await?;
        }
        Ok(())
    }

    async fn register_login(self: &Arc<Self>, router: &dyn Router) -> Result<(), RouterError> {
        let this = self.clone();
        let handler: EndpointHandler = Arc::new(move |_token, payload| {
            let this = this.clone();
            Box::pin(async move {
                let request: LoginRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(envelope(ApiResult::<Value>::error(format!("bad request: {err}")))),
                };
                Ok(envelope(this.handle_login(request).await))
            })
        });
        router.register("mdstudio.auth.endpoint.login", MatchPolicy::Exact, handler).await
    }

    async fn register_logout(self: &Arc<Self>, router: &dyn Router) -> Result<(), RouterError> {
        let this = self.clone();
        let handler: EndpointHandler = Arc::new(move |_token, payload| {
            let this = this.clone();
            Box::pin(async move {
                let request: LogoutRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(envelope(ApiResult::<Value>::error(format!("bad request: {err}")))),
                };
                Ok(envelope(this.handle_logout(request).await))
            })
        });
        router.register("mdstudio.auth.endpoint.logout", MatchPolicy::Exact, handler).await
    }

    async fn register_sign(self: &Arc<Self>, router: &dyn Router) -> Result<(), RouterError> {
        let this = self.clone();
        let handler: EndpointHandler = Arc::new(move |_token, payload| {
            let this = this.clone();
            Box::pin(async move {
                let request: SignRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(envelope(ApiResult::<Value>::error(format!("bad request: {err}")))),
                };
                let outcome = match this.token_service.sign(request.claims, &request.caller_role) {
                    Ok(token) => ApiResult::ok(json!({ "token": token })),
                    Err(err) => ApiResult::error(err.to_string()),
                };
                Ok(envelope(outcome))
            })
        });
        router.register("mdstudio.auth.endpoint.sign", MatchPolicy::Exact, handler).await
    }

    async fn register_verify(self: &Arc<Self>, router: &dyn Router) -> Result<(), RouterError> {
        let this = self.clone();
        let handler: EndpointHandler = Arc::new(move |_token, payload| {
            let this = this.clone();
            Box::pin(async move {
                let request: VerifyRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(envelope(ApiResult::<Value>::error(format!("bad request: {err}")))),
                };
                Ok(envelope(this.token_service.verify(&request.token)))
            })
        });
        router.register("mdstudio.auth.endpoint.verify", MatchPolicy::Exact, handler).await
    }

    async fn register_authorize(self: &Arc<Self>, router: &dyn Router, ring: &'static str) -> Result<(), RouterError> {
        let this = self.clone();
        let handler: EndpointHandler = Arc::new(move |_token, payload| {
            let this = this.clone();
            Box::pin(async move {
                let request: AuthorizeRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(envelope(ApiResult::<Value>::error(format!("bad request: {err}")))),
                };
                let uri = request.uri.clone();
                let decision = if ring == "oauth" {
                    let token = request.access_token.clone().unwrap_or_default();
                    let authz_request = AuthorizationRequest {
                        realm: &request.realm,
                        authid: &request.authid,
                        uri: &request.uri,
                        action: Action::Call,
                    };
                    this.authorizer.authorize_oauth(&authz_request, &token).await
                } else {
                    this.handle_authorize(request, ring)
                };
                this.authorizer.record_decision(&uri, &decision).await;
                Ok(envelope(ApiResult::ok(AuthorizeResponse {
                    allow: decision.allow,
                    disclose: decision.disclose,
                })))
            })
        });
        router
            .register(&format!("mdstudio.auth.endpoint.authorize.{ring}"), MatchPolicy::Exact, handler)
            .await
    }

    fn oauth_client_create_endpoint(&self) -> EndpointRegistration {
        let oauth_store = self.oauth_store.clone();
        let handler: EndpointFn = Arc::new(move |payload, claims| {
            let oauth_store = oauth_store.clone();
            Box::pin(async move {
                let request: OAuthClientCreateRequest = serde_json::from_value(payload)
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                let client = oauth_store.create(&claims.username, request.scopes).await;
                Ok(json!({ "id": client.client_id, "secret": client.client_secret }))
            })
        });
        EndpointRegistration {
            uri: "mdstudio.auth.endpoint.oauth.client.create".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }

    fn oauth_client_getusername_endpoint(&self) -> EndpointRegistration {
        let oauth_store = self.oauth_store.clone();
        let handler: EndpointFn = Arc::new(move |payload, _claims| {
            let oauth_store = oauth_store.clone();
            Box::pin(async move {
                let request: OAuthClientGetUsernameRequest = serde_json::from_value(payload)
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                match oauth_store.username_for(&request.client_id).await {
                    Some(username) => Ok(json!({ "username": username })),
                    None => Err(HandlerError::Failed("unknown client_id".to_string())),
                }
            })
        });
        EndpointRegistration {
            uri: "mdstudio.auth.endpoint.oauth.client.getusername".to_string(),
            input_schema: None,
            output_schema: None,
            claim_schema: None,
            scope: None,
            handler,
        }
    }
}

fn envelope<T: serde::Serialize>(result: ApiResult<T>) -> Value {
    serde_json::to_value(result).expect("ApiResult always serializes")
}

#[async_trait]
impl Component for AuthComponent {
    fn name(&self) -> &str {
        "auth"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["db".to_string(), "schema".to_string()]
    }

    fn endpoints(&self) -> Vec<EndpointRegistration> {
        vec![
            self.oauth_client_create_endpoint(),
            self.oauth_client_getusername_endpoint(),
        ]
    }
}
