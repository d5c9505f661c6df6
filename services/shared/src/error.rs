// Error handling shared across every mdstudio-* crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Error::Authentication(_) => 401,
            Error::Authorization(_) => 403,
            Error::Validation(_) => 400,
            Error::SchemaNotFound(_) => 404,
            Error::Network(_) => 502,
            Error::Configuration(_) | Error::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kind() {
        assert_eq!(Error::Authentication("x".into()).status_code(), 401);
        assert_eq!(Error::Authorization("x".into()).status_code(), 403);
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::SchemaNotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn network_errors_are_retryable() {
        assert!(Error::Network("timeout".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }
}
