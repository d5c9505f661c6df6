use thiserror::Error;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("task runner error: {0}")]
    Runner(#[from] crate::runner::RunnerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("internal error: {0}")]
    Internal(String),
}
