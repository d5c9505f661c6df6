use crate::{Error, Result};
use tracing::info;
use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize process-wide structured logging. Called once, at session
/// construction, before a component joins the router.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    Registry::default()
        .with(env_filter)
        .with(FmtLayer::new().with_current_span(true).with_span_list(true))
        .try_init()
        .map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))?;

    info!(level = log_level, "tracing initialized");
    Ok(())
}

#[macro_export]
macro_rules! log_workflow_event {
    ($workflow_id:expr, $task_id:expr, $event:expr) => {
        tracing::info!(
            workflow_id = %$workflow_id,
            task_id = %$task_id,
            event = %$event,
            "workflow event"
        );
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(error = %$error, context = %$context, "error occurred");
    };
}

// Correlation ID propagation for request tracing across the router hop.
use std::sync::Arc;
use tokio::task_local;

task_local! {
    pub static CORRELATION_ID: Arc<String>;
}

pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn with_correlation_id<F, R>(correlation_id: String, f: F) -> R
where
    F: std::future::Future<Output = R>,
{
    CORRELATION_ID.scope(Arc::new(correlation_id), f).await
}

pub fn get_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.as_ref().clone()).ok()
}
