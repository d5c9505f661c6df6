use crate::registration::EndpointRegistration;
use async_trait::async_trait;
use mdstudio_shared::types::Claims;

/// A capability a component joining the router implements, taking the place
/// of the original's session-kernel base class it inherited from (Design
/// Notes item: composition over multiple inheritance). The kernel drives
/// `pre_init`/`on_init`/`on_run` through the lifecycle in `kernel.rs`;
/// `authorize_request` is invoked synchronously on every inbound call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Peer component names this one must observe online before it leaves
    /// `WAITING_DEPS` (§4.E: "declaring required peers, e.g. db, schema").
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs in `JOINED`, before dependency announcements are awaited.
    async fn pre_init(&self) {}

    /// Runs once all dependencies are observed online, before `on_run`.
    async fn on_init(&self) {}

    /// Runs on entry to `RUNNING`, once endpoints are registered and live.
    async fn on_run(&self) {}

    /// Component-specific authorization on top of the router's own rings.
    /// `false` short-circuits the call with an unauthorized envelope.
    fn authorize_request(&self, uri: &str, claims: &Claims) -> bool {
        let _ = (uri, claims);
        true
    }

    fn endpoints(&self) -> Vec<EndpointRegistration>;
}
