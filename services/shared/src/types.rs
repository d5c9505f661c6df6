use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Common ID types
pub type Vendor = String;
pub type ComponentName = String;
pub type Username = String;
pub type UserId = String;
pub type SessionId = i64;
pub type WorkflowId = String;

/// Which connection established the claims this call is running under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionType {
    User,
    Group,
    GroupRole,
}

/// The decoded contents of a verified bearer token (§3 "Claims token").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: Username,
    pub groups: Vec<String>,
    pub vendor: Vendor,
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
    pub connection_type: ConnectionType,
    pub access_token: Option<String>,
}

/// The envelope every RPC call returns: exactly one of the four variants.
/// A Rust enum makes invariant §8.7 ("no response ever carries more than
/// one of result/error/expired simultaneously") true by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiResult<T> {
    Result { result: T },
    ResultWithWarning { result: T, warning: String },
    Error { error: String },
    Expired { expired: String },
}

impl<T> ApiResult<T> {
    pub fn ok(result: T) -> Self {
        ApiResult::Result { result }
    }

    pub fn ok_with_warning(result: T, warning: impl Into<String>) -> Self {
        ApiResult::ResultWithWarning {
            result,
            warning: warning.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResult::Error {
            error: message.into(),
        }
    }

    pub fn expired(message: impl Into<String>) -> Self {
        ApiResult::Expired {
            expired: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ApiResult::Result { .. } | ApiResult::ResultWithWarning { .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub checks: std::collections::HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: u64,
}
