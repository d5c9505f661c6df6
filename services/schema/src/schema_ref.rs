use crate::model::SchemaType;

/// A parsed `endpoint://vendor/component/name/version` (or `claims://`,
/// `resource://`) reference, resolved against the schema store by the
/// validator. `version` is `None` when the reference asks for the latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef {
    pub schema_type: SchemaType,
    pub vendor: String,
    pub component: String,
    pub name: String,
    pub version: Option<u32>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaRefParseError {
    #[error("unrecognized schema reference scheme: {0}")]
    UnknownScheme(String),
    #[error("malformed schema reference: {0}")]
    Malformed(String),
}

impl SchemaRef {
    pub fn parse(reference: &str) -> Result<Self, SchemaRefParseError> {
        let (scheme, rest) = reference
            .split_once("://")
            .ok_or_else(|| SchemaRefParseError::Malformed(reference.to_string()))?;

        let schema_type = match scheme {
            "endpoint" => SchemaType::Endpoint,
            "resource" => SchemaType::Resource,
            "claims" | "claim" => SchemaType::Claim,
            other => return Err(SchemaRefParseError::UnknownScheme(other.to_string())),
        };

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [vendor, component, name] => Ok(SchemaRef {
                schema_type,
                vendor: vendor.to_string(),
                component: component.to_string(),
                name: name.to_string(),
                version: None,
            }),
            [vendor, component, name, version] => {
                let version = version
                    .parse::<u32>()
                    .map_err(|_| SchemaRefParseError::Malformed(reference.to_string()))?;
                Ok(SchemaRef {
                    schema_type,
                    vendor: vendor.to_string(),
                    component: component.to_string(),
                    name: name.to_string(),
                    version: Some(version),
                })
            }
            _ => Err(SchemaRefParseError::Malformed(reference.to_string())),
        }
    }
}
