//! The contract every `mdstudio-session` component requires of "the message
//! router" (§1 of the spec: the router itself is assumed external). This
//! crate defines the `Router` trait plus an in-memory broker implementation
//! used by every component's own tests and by single-process deployments.
//! A production build swaps in a real router client behind the same trait;
//! that client is out of scope here, the same way the database driver is.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};

pub type RpcFuture = Pin<Box<dyn Future<Output = Result<Value, RouterError>> + Send>>;

/// A registered endpoint handler: takes the caller's bearer token (if any)
/// and the raw request payload, returns the raw response payload. The
/// session kernel wraps the component's actual handler in the
/// verify/validate/authorize pipeline before it ever reaches here; the
/// router only knows about "deliver this call to that URI".
pub type EndpointHandler = Arc<dyn Fn(Option<String>, Value) -> RpcFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no endpoint registered for uri: {0}")]
    NotRegistered(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// How a registered URI was matched against an inbound call — carried
/// through to the authorizer's registration-stats bookkeeping (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPolicy {
    Exact,
    Prefix,
    Wildcard,
}

#[async_trait]
pub trait Router: Send + Sync {
    /// Register a handler for `uri`. Re-registering the same `uri` replaces
    /// the previous handler (matches the kernel's reconnect-then-reregister
    /// behavior after a transport fault).
    async fn register(
        &self,
        uri: &str,
        policy: MatchPolicy,
        handler: EndpointHandler,
    ) -> Result<(), RouterError>;

    async fn unregister(&self, uri: &str) -> Result<(), RouterError>;

    /// Deliver an RPC call to whichever registered URI matches, honoring
    /// FIFO order per URI (§5: "handlers observe FIFO order per URI").
    async fn call(
        &self,
        uri: &str,
        token: Option<String>,
        payload: Value,
    ) -> Result<(Value, MatchPolicy), RouterError>;

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), RouterError>;

    /// Subscribe to a topic (e.g. `...endpoint.events.online`). Returns a
    /// broadcast receiver so multiple components can each observe the
    /// announcement independently, the way WAMP pub/sub fans events out.
    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value>;
}

struct Registration {
    handler: EndpointHandler,
    policy: MatchPolicy,
    // Serializes calls to this URI so handlers see FIFO delivery per-URI
    // while different URIs still run concurrently (§5).
    call_lock: Arc<Mutex<()>>,
}

/// The default, in-process broker. Exact-match lookup first, then the
/// longest registered prefix, matching the router's documented match
/// policy (exact > prefix > wildcard).
pub struct InMemoryRouter {
    registrations: RwLock<HashMap<String, Registration>>,
    topics: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl InMemoryRouter {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
        }
    }

    async fn resolve(&self, uri: &str) -> Option<String> {
        let registrations = self.registrations.read().await;
        if registrations.contains_key(uri) {
            return Some(uri.to_string());
        }
        registrations
            .keys()
            .filter(|registered| uri.starts_with(registered.as_str()))
            .max_by_key(|registered| registered.len())
            .cloned()
    }
}

impl Default for InMemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Router for InMemoryRouter {
    async fn register(
        &self,
        uri: &str,
        policy: MatchPolicy,
        handler: EndpointHandler,
    ) -> Result<(), RouterError> {
        let mut registrations = self.registrations.write().await;
        registrations.insert(
            uri.to_string(),
            Registration {
                handler,
                policy,
                call_lock: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    async fn unregister(&self, uri: &str) -> Result<(), RouterError> {
        self.registrations.write().await.remove(uri);
        Ok(())
    }

    async fn call(
        &self,
        uri: &str,
        token: Option<String>,
        payload: Value,
    ) -> Result<(Value, MatchPolicy), RouterError> {
        let matched_uri = self
            .resolve(uri)
            .await
            .ok_or_else(|| RouterError::NotRegistered(uri.to_string()))?;

        let (handler, policy, call_lock) = {
            let registrations = self.registrations.read().await;
            let reg = registrations
                .get(&matched_uri)
                .ok_or_else(|| RouterError::NotRegistered(uri.to_string()))?;
            (reg.handler.clone(), reg.policy, reg.call_lock.clone())
        };

        let _permit = call_lock.lock().await;
        let result = handler(token, payload).await?;
        Ok((result, policy))
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), RouterError> {
        let topics = self.topics.read().await;
        if let Some(sender) = topics.get(topic) {
            // No subscribers is not an error — matches WAMP pub/sub semantics.
            let _ = sender.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut topics = self.topics.write().await;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(64).0);
        sender.subscribe()
    }
}
