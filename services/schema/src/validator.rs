use crate::schema_ref::{SchemaRef, SchemaRefParseError};
use crate::store::SchemaStore;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One finding from a failed validation, matching the `{path, expected,
/// actual}` triple in §6 of the spec.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("schema reference error: {0}")]
    Reference(#[from] SchemaRefParseError),
    #[error("no schema found for reference")]
    SchemaNotFound,
    #[error("schema body is not a valid JSON Schema: {0}")]
    InvalidSchema(String),
    #[error("document failed validation")]
    Invalid(Vec<ValidationIssue>),
}

/// Compiles and caches JSON Schema validators, resolving `endpoint://`,
/// `resource://`, and `claims://` references against a `SchemaStore`
/// (component B). Compilation is the expensive part of `jsonschema::Validator`
/// construction, so a reference is only ever compiled once per schema body.
pub struct SchemaValidator {
    store: Arc<dyn SchemaStore>,
    cache: Mutex<HashMap<String, Arc<Validator>>>,
}

impl SchemaValidator {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Validates `document` against the schema named by `reference`
    /// (e.g. `endpoint://mdstudio/schema/upload/1`, or unversioned for
    /// latest). Returns `Ok(())` when the document conforms.
    pub async fn validate(
        &self,
        reference: &str,
        document: &Value,
    ) -> Result<(), ValidatorError> {
        let schema_ref = SchemaRef::parse(reference)?;

        let doc = self
            .store
            .find_latest(
                &schema_ref.vendor,
                &schema_ref.component,
                schema_ref.schema_type,
                &schema_ref.name,
                schema_ref.version,
            )
            .await
            .ok_or(ValidatorError::SchemaNotFound)?;

        let cache_key = format!(
            "{}/{}/{}/{}/{}",
            schema_ref.schema_type, doc.vendor, doc.component, doc.name, doc.version
        );

        let validator = self.compiled(&cache_key, &doc.body).await?;
        Self::check(&validator, document)
    }

    /// Resolves `reference` to its stored schema body without validating
    /// anything, so a caller (e.g. the session kernel merging a default
    /// claim schema with an endpoint's declared one) can combine it with
    /// other schema fragments before compiling.
    pub async fn resolve_schema_body(&self, reference: &str) -> Result<Value, ValidatorError> {
        let schema_ref = SchemaRef::parse(reference)?;
        let doc = self
            .store
            .find_latest(
                &schema_ref.vendor,
                &schema_ref.component,
                schema_ref.schema_type,
                &schema_ref.name,
                schema_ref.version,
            )
            .await
            .ok_or(ValidatorError::SchemaNotFound)?;
        Ok(doc.body)
    }

    /// Validates `document` against a schema body supplied directly,
    /// bypassing store resolution. Used for synthetic schemas assembled at
    /// call time (e.g. `{"allOf": [default_claim_schema, endpoint_claim_schema]}`).
    pub async fn validate_body(
        &self,
        schema_body: &Value,
        document: &Value,
    ) -> Result<(), ValidatorError> {
        let cache_key = format!("inline:{schema_body}");
        let validator = self.compiled(&cache_key, schema_body).await?;
        Self::check(&validator, document)
    }

    fn check(validator: &Validator, document: &Value) -> Result<(), ValidatorError> {
        let issues: Vec<ValidationIssue> = validator
            .iter_errors(document)
            .map(|error| ValidationIssue {
                path: error.instance_path.to_string(),
                expected: error.schema_path.to_string(),
                actual: error.instance.to_string(),
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidatorError::Invalid(issues))
        }
    }

    async fn compiled(
        &self,
        cache_key: &str,
        schema_body: &Value,
    ) -> Result<Arc<Validator>, ValidatorError> {
        if let Some(validator) = self.cache.lock().await.get(cache_key) {
            return Ok(validator.clone());
        }

        let validator = jsonschema::validator_for(schema_body)
            .map_err(|e| ValidatorError::InvalidSchema(e.to_string()))?;
        let validator = Arc::new(validator);

        self.cache
            .lock()
            .await
            .insert(cache_key.to_string(), validator.clone());
        Ok(validator)
    }
}
