//! Pluggable task dispatch (§4.G: "a local closure/`Fn` runner or a remote
//! RPC invocation over `reqwest`"). The engine only ever talks to the
//! `TaskRunner` trait object; it never knows whether a task resolves in
//! process or over the wire.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("task produced no payload")]
    NoPayload,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("task cancelled")]
    Cancelled,
}

pub type RunFuture = Pin<Box<dyn Future<Output = Result<Value, RunnerError>> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Dispatch `task_id` with `input`. `cancel` fires if `cancel()` is
    /// called on the engine while the task is active; a well-behaved runner
    /// observes it and returns `Err(RunnerError::Cancelled)` promptly.
    async fn run(&self, task_id: &str, input: Value, cancel: CancellationToken) -> Result<Value, RunnerError>;
}

/// Runs a task via an in-process closure, the Rust analogue of the
/// original's local Python-callable runner.
pub struct LocalRunner {
    handlers: std::collections::HashMap<String, Arc<dyn Fn(Value) -> RunFuture + Send + Sync>>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self {
            handlers: std::collections::HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, task_id: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> RunFuture + Send + Sync + 'static,
    {
        self.handlers.insert(task_id.into(), Arc::new(handler));
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for LocalRunner {
    async fn run(&self, task_id: &str, input: Value, cancel: CancellationToken) -> Result<Value, RunnerError> {
        let Some(handler) = self.handlers.get(task_id).cloned() else {
            return Err(RunnerError::Transport(format!("no local handler registered for {task_id}")));
        };
        tokio::select! {
            result = handler(input) => result,
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        }
    }
}

/// Dispatches a task by POSTing its input to `{base_url}/{task_id}` and
/// treating the response body as the task's output, standing in for the
/// original's remote RPC invocation over the message router.
pub struct RemoteRunner {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteRunner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TaskRunner for RemoteRunner {
    async fn run(&self, task_id: &str, input: Value, cancel: CancellationToken) -> Result<Value, RunnerError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), task_id);
        let request = self.client.post(&url).json(&input).send();
        let response = tokio::select! {
            result = request => result.map_err(|e| RunnerError::Transport(e.to_string()))?,
            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
        };
        response
            .json::<Value>()
            .await
            .map_err(|e| RunnerError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn local_runner_dispatches_registered_handler() {
        let mut runner = LocalRunner::new();
        runner.register("echo", |input| Box::pin(async move { Ok(input) }));

        let result = runner.run("echo", json!({"a": 1}), CancellationToken::new()).await.unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[tokio::test]
    async fn local_runner_rejects_unknown_task_id() {
        let runner = LocalRunner::new();
        let err = runner.run("missing", json!({}), CancellationToken::new()).await;
        assert!(matches!(err, Err(RunnerError::Transport(_))));
    }

    #[tokio::test]
    async fn mocked_runner_dispatches_and_bubbles_cancellation() {
        let mut mock = MockTaskRunner::new();
        mock.expect_run()
            .times(1)
            .returning(|task_id, input, _| {
                assert_eq!(task_id, "echo");
                Ok(input)
            });

        let result = mock.run("echo", json!({"a": 1}), CancellationToken::new()).await.unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[tokio::test]
    async fn local_runner_observes_cancellation() {
        let mut runner = LocalRunner::new();
        runner.register("slow", |_input| {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                Ok(json!({}))
            })
        });

        let token = CancellationToken::new();
        token.cancel();
        let err = runner.run("slow", json!({}), token).await;
        assert!(matches!(err, Err(RunnerError::Cancelled)));
    }
}
