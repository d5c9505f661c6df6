use axum::{extract::State, middleware, routing::get, Json, Router};
use mdstudio_shared::health::HealthChecker;
use mdstudio_shared::middleware::{logging_middleware, request_id_middleware};
use mdstudio_shared::types::HealthStatus;
use mdstudio_shared::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// The ambient HTTP surface every component carries regardless of the
/// router RPC it actually serves business traffic over: a health check an
/// orchestrator can poll without speaking the router's wire protocol.
pub struct HealthServer {
    app: Router,
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(port: u16, checker: Arc<HealthChecker>) -> Self {
        let app = Router::new()
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(logging_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(checker);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self { app, addr }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!(addr = %self.addr, "auth service health endpoint listening");
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| mdstudio_shared::Error::Network(e.to_string()))?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| mdstudio_shared::Error::Network(e.to_string()))?;
        Ok(())
    }
}

async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> Json<HealthStatus> {
    Json(checker.check_health().await)
}
