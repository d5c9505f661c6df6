//! Auth service (component F): collects the schema/token/authorizer
//! building blocks into the router-facing endpoints described in the spec
//! (login, logout, sign, verify, authorize.*, oauth.client.*).

pub mod component;
pub mod dbwaiter;
pub mod requests;
pub mod server;
pub mod stores;

pub use component::AuthComponent;
pub use dbwaiter::DBWaiter;
