//! Token signing/verification (component C) and the five-ring authorizer
//! (component D). Kept as their own crate because the session kernel, the
//! auth service, and the workflow engine all need to verify/authorize calls
//! without depending on each other.

mod claims;
pub mod authorizer;
pub mod token;

pub use authorizer::{
    Action, AuthorizationDecision, AuthorizationRequest, Authorizer, OAuthScopeResolver,
    RegistrationStats,
};
pub use token::{TokenError, TokenService};
