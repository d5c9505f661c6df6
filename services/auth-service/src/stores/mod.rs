pub mod oauth_client;
pub mod session;
pub mod user;

pub use oauth_client::{InMemoryOAuthClientStore, OAuthClient, OAuthClientStore};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use user::{InMemoryUserStore, User, UserStore};
