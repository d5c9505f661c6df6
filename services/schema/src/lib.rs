//! Schema registry: versioned storage of endpoint/resource/claim JSON
//! Schemas (component A) plus the validator that compiles and applies them
//! (component B).

pub mod model;
pub mod schema_ref;
pub mod store;
pub mod validator;

pub use model::{SchemaDocument, SchemaKey, SchemaType};
pub use schema_ref::{SchemaRef, SchemaRefParseError};
pub use store::{InMemorySchemaStore, SchemaStore, SchemaStoreError};
pub use validator::{SchemaValidator, ValidationIssue, ValidatorError};
