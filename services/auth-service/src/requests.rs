use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub realm: String,
    pub authid: String,
    pub authmethod: String,
    /// The password (ticket auth) or the client secret (OAuth
    /// client-credentials), depending on which account type `authid` names.
    pub ticket: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub realm: String,
    pub role: String,
    pub extra: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub user_id: String,
    pub session_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub claims: mdstudio_shared::types::Claims,
    pub caller_role: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub realm: String,
    pub authid: String,
    pub uri: String,
    pub action: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub allow: bool,
    pub disclose: bool,
}

/// The owner is the kernel-verified caller (`claims.username`), never a
/// client-supplied field — an OAuth client is always minted under the
/// caller's own identity.
#[derive(Debug, Deserialize)]
pub struct OAuthClientCreateRequest {
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthClientGetUsernameRequest {
    pub client_id: String,
}
