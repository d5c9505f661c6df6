//! The session kernel (component E): the five-state component lifecycle,
//! declarative endpoint registration, and the verify/claims/authorize/
//! input/output call pipeline every registered endpoint runs through.

pub mod component;
pub mod kernel;
pub mod registration;
pub mod state;

pub use component::Component;
pub use kernel::{KernelError, SessionKernel};
pub use registration::{EndpointFn, EndpointFuture, EndpointRegistration, HandlerError};
pub use state::ComponentState;
