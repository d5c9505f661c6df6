use crate::claims::JwtClaims;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mdstudio_shared::types::{ApiResult, Claims};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("caller role {0:?} is not permitted to sign tokens")]
    CallerNotPermitted(String),
    #[error("token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

const INTERNAL_ROLES: &[&str] = &["db", "schema", "auth", "logger"];
const SIGN_TTL_MINUTES: i64 = 5;

/// Signs and verifies MDStudio bearer tokens (component C). Mirrors the
/// teacher's `JwtService` (HS256, single shared secret, no rotation) with a
/// caller-role gate on signing and `MDStudioClaims` in place of the
/// tenant-centric `Claims`.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false; // verify() does its own wall-clock comparison
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// `sign(claims, caller_role)`. Only the internal roles may call; the
    /// service stamps `groups=["mdstudio"]`, `username=caller_role`, and a
    /// fresh 5-minute expiry, ignoring whatever the caller supplied for
    /// those fields (§4.C).
    pub fn sign(&self, mut claims: Claims, caller_role: &str) -> Result<String, TokenError> {
        if !INTERNAL_ROLES.contains(&caller_role) {
            return Err(TokenError::CallerNotPermitted(caller_role.to_string()));
        }

        let now = Utc::now();
        claims.username = caller_role.to_string();
        claims.groups = vec!["mdstudio".to_string()];
        claims.expires_at = now + Duration::minutes(SIGN_TTL_MINUTES);

        let wire = JwtClaims::from_claims(&claims, now);
        encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key).map_err(TokenError::from)
    }

    /// `verify(token) → {claims} | {error} | {expired}`. Never returns an
    /// `Err`: every outcome, including a malformed or expired token, is
    /// carried in the `ApiResult` envelope so the session kernel's pipeline
    /// can route it without special-casing a transport error.
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        let decoded = match decode::<JwtClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => return ApiResult::error(format!("invalid token: {e}")),
        };

        if decoded.exp <= Utc::now().timestamp() {
            return ApiResult::expired("token has expired");
        }

        ApiResult::ok(decoded.into_claims())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdstudio_shared::types::ConnectionType;

    fn sample_claims() -> Claims {
        Claims {
            username: "whoever-calls-sign".to_string(),
            groups: vec![],
            vendor: "mdstudio".to_string(),
            session_id: 1,
            expires_at: Utc::now(),
            connection_type: ConnectionType::User,
            access_token: None,
        }
    }

    #[test]
    fn sign_rejects_non_internal_caller() {
        let service = TokenService::new("secret");
        let err = service.sign(sample_claims(), "attacker").unwrap_err();
        assert!(matches!(err, TokenError::CallerNotPermitted(_)));
    }

    #[test]
    fn sign_then_verify_round_trips_and_overwrites_identity_fields() {
        let service = TokenService::new("secret");
        let token = service.sign(sample_claims(), "auth").unwrap();

        match service.verify(&token) {
            ApiResult::Result { result } => {
                assert_eq!(result.username, "auth");
                assert_eq!(result.groups, vec!["mdstudio".to_string()]);
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let service = TokenService::new("secret");
        let other = TokenService::new("different-secret");
        let token = service.sign(sample_claims(), "auth").unwrap();

        match other.verify(&token) {
            ApiResult::Error { .. } => {}
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn verify_reports_expired_token() {
        let service = TokenService::new("secret");
        let mut claims = sample_claims();
        claims.expires_at = Utc::now() - Duration::minutes(10);
        let wire = JwtClaims::from_claims(&claims, Utc::now() - Duration::minutes(10));
        let token = encode(&Header::new(Algorithm::HS256), &wire, &service.encoding_key).unwrap();

        match service.verify(&token) {
            ApiResult::Expired { .. } => {}
            other => panic!("expected Expired, got {other:?}"),
        }
    }
}
