use mdstudio_router::Router;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

const DB_ONLINE_TOPIC: &str = "mdstudio.db.endpoint.events.online";
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gates the `_store_action` side effect on the database component being
/// online, using exactly one mechanism (event subscription) rather than
/// the original's racy combination of polling a readiness flag and also
/// listening for the event (§4.F, Design Notes item 6). A background task
/// owns the subscription and flips `ready` once; callers that arrive before
/// it fires wait on their own bounded subscription instead of polling.
pub struct DBWaiter {
    router: Arc<dyn Router>,
    ready: Arc<AtomicBool>,
    wait_timeout: Duration,
}

impl DBWaiter {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self::with_timeout(router, WAIT_TIMEOUT)
    }

    pub fn with_timeout(router: Arc<dyn Router>, wait_timeout: Duration) -> Self {
        let ready = Arc::new(AtomicBool::new(false));
        let background_router = router.clone();
        let background_ready = ready.clone();
        tokio::spawn(async move {
            let mut receiver = background_router.subscribe(DB_ONLINE_TOPIC).await;
            if receiver.recv().await.is_ok() {
                background_ready.store(true, Ordering::SeqCst);
            }
        });
        Self {
            router,
            ready,
            wait_timeout,
        }
    }

    /// Runs `action` once the database is known online, or once
    /// `WAIT_TIMEOUT` elapses — whichever comes first. `action` must be
    /// idempotent, since a caller that times out here may still race a
    /// database that comes online moments later.
    pub async fn run_when_ready<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.ready.load(Ordering::SeqCst) {
            let mut receiver = self.router.subscribe(DB_ONLINE_TOPIC).await;
            match timeout(self.wait_timeout, receiver.recv()).await {
                Ok(Ok(_)) => self.ready.store(true, Ordering::SeqCst),
                Ok(Err(_)) => warn!("db online channel closed while waiting"),
                Err(_) => warn!("timed out waiting for db online; proceeding anyway"),
            }
        }
        action().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdstudio_router::InMemoryRouter;
    use serde_json::json;

    #[tokio::test]
    async fn runs_immediately_once_db_online_event_fires() {
        let router = Arc::new(InMemoryRouter::new());
        let waiter = DBWaiter::new(router.clone());

        router.publish(DB_ONLINE_TOPIC, json!({"online": true})).await.unwrap();
        tokio::task::yield_now().await;

        let ran = waiter.run_when_ready(|| async { true }).await;
        assert!(ran);
    }

    #[tokio::test]
    async fn falls_through_after_timeout_without_hanging_forever() {
        let router = Arc::new(InMemoryRouter::new());
        let waiter = DBWaiter::with_timeout(router, Duration::from_millis(20));
        let ran = waiter.run_when_ready(|| async { "ran-anyway" }).await;
        assert_eq!(ran, "ran-anyway");
    }
}
