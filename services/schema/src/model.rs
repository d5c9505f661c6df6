use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Endpoint,
    Resource,
    Claim,
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchemaType::Endpoint => "endpoint",
            SchemaType::Resource => "resource",
            SchemaType::Claim => "claim",
        };
        write!(f, "{s}")
    }
}

/// Primary key of a schema document: (vendor, component, type, name).
/// Versions for a given key form a dense 1..k sequence (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    pub vendor: String,
    pub component: String,
    pub schema_type: SchemaType,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub vendor: String,
    pub component: String,
    pub schema_type: SchemaType,
    pub name: String,
    pub version: u32,
    pub body: serde_json::Value,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}
