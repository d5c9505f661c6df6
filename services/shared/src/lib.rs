// Common utilities shared across every mdstudio-* component.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_tracing;

#[cfg(test)]
mod tests {
    #[test]
    fn shared_library_compiles() {
        assert_eq!(2 + 2, 4);
    }
}
