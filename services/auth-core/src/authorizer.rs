use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdstudio_router::MatchPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single decision ring's view of the call being authorized.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub realm: &'a str,
    pub authid: &'a str,
    pub uri: &'a str,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Call,
    Subscribe,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allow: bool,
    pub disclose: bool,
}

impl AuthorizationDecision {
    pub fn deny() -> Self {
        Self {
            allow: false,
            disclose: false,
        }
    }

    pub fn allow(disclose: bool) -> Self {
        Self {
            allow: true,
            disclose,
        }
    }
}

/// Resolves an OAuth `authid` to its granted scopes, queried by the OAuth
/// ring. Backed by the auth service's client store; kept as a trait here so
/// `mdstudio-auth-core` does not depend on the auth service crate.
#[async_trait]
pub trait OAuthScopeResolver: Send + Sync {
    async fn scopes_for(&self, authid: &str, access_token: &str) -> Option<Vec<String>>;
}

/// One row of `{uri, match, firstRegistration, latestRegistration,
/// registrationCount, latestCall, callCount}` (§3), keyed by `(uri, match)`
/// since the same URI can be registered under more than one match policy.
#[derive(Debug, Clone, Default)]
struct RegistrationStat {
    registration_count: u64,
    call_count: u64,
    first_registration: Option<DateTime<Utc>>,
    latest_registration: Option<DateTime<Utc>>,
    latest_call: Option<DateTime<Utc>>,
}

/// Best-effort registration/call bookkeeping kept alongside every
/// registration and every allow decision (§4.D: "stats writes are
/// best-effort and must not fail the decision").
#[derive(Default)]
pub struct RegistrationStats {
    stats: RwLock<HashMap<(String, MatchPolicy), RegistrationStat>>,
}

impl RegistrationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the kernel's join/register_endpoint path (§4.E step:
    /// component registers its endpoints with the router) once per
    /// `(uri, match)` registration.
    pub async fn record_registration(&self, uri: &str, policy: MatchPolicy) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry((uri.to_string(), policy)).or_default();
        entry.registration_count += 1;
        let now = Utc::now();
        entry.first_registration.get_or_insert(now);
        entry.latest_registration = Some(now);
    }

    /// Call-time stats don't carry a match policy (the authorize RPC only
    /// sees `uri`/`authid`/`action`), so this bumps every row already
    /// registered under that URI — in practice exactly one.
    pub async fn record_call(&self, uri: &str) {
        let mut stats = self.stats.write().await;
        let now = Utc::now();
        let mut touched = false;
        for (key, entry) in stats.iter_mut() {
            if key.0 == uri {
                entry.call_count += 1;
                entry.latest_call = Some(now);
                touched = true;
            }
        }
        if !touched {
            let entry = stats.entry((uri.to_string(), MatchPolicy::Exact)).or_default();
            entry.call_count += 1;
            entry.latest_call = Some(now);
        }
    }

    pub async fn call_count(&self, uri: &str) -> u64 {
        self.stats
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.0 == uri)
            .map(|(_, stat)| stat.call_count)
            .sum()
    }

    pub async fn registration_count(&self, uri: &str, policy: MatchPolicy) -> u64 {
        self.stats
            .read()
            .await
            .get(&(uri.to_string(), policy))
            .map(|s| s.registration_count)
            .unwrap_or(0)
    }
}

/// Decides allow/deny across the five rings described in §4.D, tried in the
/// order the router would invoke them for a given caller role.
pub struct Authorizer {
    /// role -> permitted URI prefixes, for the ring-0 ACL.
    ring0_acl: HashMap<String, Vec<String>>,
    oauth_resolver: Option<Box<dyn OAuthScopeResolver>>,
    pub stats: Arc<RegistrationStats>,
}

impl Authorizer {
    pub fn new(ring0_acl: HashMap<String, Vec<String>>) -> Self {
        Self {
            ring0_acl,
            oauth_resolver: None,
            stats: Arc::new(RegistrationStats::new()),
        }
    }

    /// Shares a single stats sink between this authorizer and whatever else
    /// records registrations against it (the session kernel, via
    /// `SessionKernel::with_registration_stats`).
    pub fn with_stats(mut self, stats: Arc<RegistrationStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_oauth_resolver(mut self, resolver: Box<dyn OAuthScopeResolver>) -> Self {
        self.oauth_resolver = Some(resolver);
        self
    }

    /// Ring 1: admin. Any action is allowed; `disclose` is turned on only
    /// for the auth service's own OAuth management endpoints.
    pub fn authorize_admin(&self, request: &AuthorizationRequest<'_>) -> AuthorizationDecision {
        let disclose = request.uri.starts_with("mdstudio.auth.endpoint.oauth.");
        AuthorizationDecision::allow(disclose)
    }

    /// Ring 2: ring-0, the internal-role ACL.
    pub fn authorize_ring0(&self, request: &AuthorizationRequest<'_>) -> AuthorizationDecision {
        let permitted = match self.ring0_acl.get(request.authid) {
            Some(prefixes) => prefixes,
            None => return AuthorizationDecision::deny(),
        };

        if permitted.iter().any(|prefix| request.uri.starts_with(prefix.as_str())) {
            AuthorizationDecision::allow(false)
        } else {
            AuthorizationDecision::deny()
        }
    }

    /// Ring 3: OAuth. Resolves the caller's granted scopes and checks the
    /// requested URI+action against them.
    pub async fn authorize_oauth(
        &self,
        request: &AuthorizationRequest<'_>,
        access_token: &str,
    ) -> AuthorizationDecision {
        let Some(resolver) = &self.oauth_resolver else {
            return AuthorizationDecision::deny();
        };

        match resolver.scopes_for(request.authid, access_token).await {
            Some(scopes) if scopes.iter().any(|scope| request.uri.starts_with(scope.as_str())) => {
                AuthorizationDecision::allow(false)
            }
            _ => AuthorizationDecision::deny(),
        }
    }

    /// Ring 4: user. Reserved, currently deny-all (§4.D, §9 Open Questions).
    pub fn authorize_user(&self, _request: &AuthorizationRequest<'_>) -> AuthorizationDecision {
        AuthorizationDecision::deny()
    }

    /// Ring 5: public. Reserved, currently deny-all.
    pub fn authorize_public(&self, _request: &AuthorizationRequest<'_>) -> AuthorizationDecision {
        AuthorizationDecision::deny()
    }

    /// Records the side-effect stats for a decision without letting a stats
    /// failure affect the already-made decision.
    pub async fn record_decision(&self, uri: &str, decision: &AuthorizationDecision) {
        if decision.allow {
            self.stats.record_call(uri).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(authid: &'a str, uri: &'a str) -> AuthorizationRequest<'a> {
        AuthorizationRequest {
            realm: "mdstudio",
            authid,
            uri,
            action: Action::Call,
        }
    }

    #[test]
    fn admin_allows_everything_and_discloses_only_oauth_management() {
        let authorizer = Authorizer::new(HashMap::new());
        let decision = authorizer.authorize_admin(&request("admin", "mdstudio.db.endpoint.find"));
        assert_eq!(decision, AuthorizationDecision::allow(false));

        let oauth_decision =
            authorizer.authorize_admin(&request("admin", "mdstudio.auth.endpoint.oauth.client.create"));
        assert_eq!(oauth_decision, AuthorizationDecision::allow(true));
    }

    #[test]
    fn ring0_allows_only_configured_prefixes() {
        let mut acl = HashMap::new();
        acl.insert("db".to_string(), vec!["mdstudio.db.endpoint.".to_string()]);
        let authorizer = Authorizer::new(acl);

        let allowed = authorizer.authorize_ring0(&request("db", "mdstudio.db.endpoint.find"));
        assert!(allowed.allow);

        let denied = authorizer.authorize_ring0(&request("db", "mdstudio.auth.endpoint.login"));
        assert!(!denied.allow);

        let unknown_role = authorizer.authorize_ring0(&request("nobody", "mdstudio.db.endpoint.find"));
        assert!(!unknown_role.allow);
    }

    #[test]
    fn user_and_public_rings_deny_all() {
        let authorizer = Authorizer::new(HashMap::new());
        assert!(!authorizer.authorize_user(&request("anyone", "mdstudio.x")).allow);
        assert!(!authorizer.authorize_public(&request("anyone", "mdstudio.x")).allow);
    }

    #[tokio::test]
    async fn oauth_ring_denies_without_resolver() {
        let authorizer = Authorizer::new(HashMap::new());
        let decision = authorizer
            .authorize_oauth(&request("client-1", "mdstudio.workflow.endpoint.run"), "tok")
            .await;
        assert!(!decision.allow);
    }

    #[tokio::test]
    async fn stats_record_calls_without_affecting_decision() {
        let authorizer = Authorizer::new(HashMap::new());
        let decision = authorizer.authorize_admin(&request("admin", "mdstudio.db.endpoint.find"));
        authorizer.record_decision("mdstudio.db.endpoint.find", &decision).await;
        assert_eq!(authorizer.stats.call_count("mdstudio.db.endpoint.find").await, 1);
    }

    #[tokio::test]
    async fn registration_stats_are_keyed_by_uri_and_match() {
        let stats = RegistrationStats::new();
        stats.record_registration("mdstudio.db.endpoint.find", MatchPolicy::Exact).await;
        stats.record_registration("mdstudio.db.endpoint.find", MatchPolicy::Exact).await;
        stats.record_registration("mdstudio.db.endpoint.", MatchPolicy::Prefix).await;

        assert_eq!(
            stats
                .registration_count("mdstudio.db.endpoint.find", MatchPolicy::Exact)
                .await,
            2
        );
        assert_eq!(
            stats
                .registration_count("mdstudio.db.endpoint.find", MatchPolicy::Prefix)
                .await,
            0
        );
        assert_eq!(
            stats
                .registration_count("mdstudio.db.endpoint.", MatchPolicy::Prefix)
                .await,
            1
        );
    }
}
