use chrono::{DateTime, TimeZone, Utc};
use mdstudio_shared::types::Claims;
use serde::{Deserialize, Serialize};

/// The on-the-wire shape of a signed token: identical fields to
/// `mdstudio_shared::types::Claims` but with `exp`/`iat` as the numeric unix
/// timestamps `jsonwebtoken` expects instead of `DateTime<Utc>`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JwtClaims {
    pub username: String,
    pub groups: Vec<String>,
    pub vendor: String,
    pub session_id: i64,
    pub connection_type: mdstudio_shared::types::ConnectionType,
    pub access_token: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl JwtClaims {
    pub fn from_claims(claims: &Claims, iat: DateTime<Utc>) -> Self {
        Self {
            username: claims.username.clone(),
            groups: claims.groups.clone(),
            vendor: claims.vendor.clone(),
            session_id: claims.session_id,
            connection_type: claims.connection_type,
            access_token: claims.access_token.clone(),
            exp: claims.expires_at.timestamp(),
            iat: iat.timestamp(),
        }
    }

    pub fn into_claims(self) -> Claims {
        Claims {
            username: self.username,
            groups: self.groups,
            vendor: self.vendor,
            session_id: self.session_id,
            expires_at: Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now),
            connection_type: self.connection_type,
            access_token: self.access_token,
        }
    }
}
