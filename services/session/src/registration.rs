use mdstudio_shared::types::Claims;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
}

pub type EndpointFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// A component's user handler: the validated request body plus the caller's
/// verified claims in, a JSON result or a business error out. Ordinary
/// `async fn`s satisfy this the same way they satisfy `async_trait` methods;
/// there is no separate "deferred" value type for sync vs. async handlers
/// (§4.E, Design Notes item 1).
pub type EndpointFn = Arc<dyn Fn(Value, Claims) -> EndpointFuture + Send + Sync>;

/// Declarative capture of one endpoint a component exposes, built once at
/// construction time and handed to the kernel as a `Vec<EndpointRegistration>`
/// instead of recovered from decorator metadata (§4.E, Design Notes item 2).
#[derive(Clone)]
pub struct EndpointRegistration {
    pub uri: String,
    pub input_schema: Option<String>,
    pub output_schema: Option<String>,
    pub claim_schema: Option<String>,
    pub scope: Option<String>,
    pub handler: EndpointFn,
}

impl std::fmt::Debug for EndpointRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistration")
            .field("uri", &self.uri)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("claim_schema", &self.claim_schema)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
