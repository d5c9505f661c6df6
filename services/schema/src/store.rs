use crate::model::{SchemaDocument, SchemaKey, SchemaType};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum SchemaStoreError {
    #[error("schema not found for {vendor}/{component}/{schema_type}/{name}")]
    NotFound {
        vendor: String,
        component: String,
        schema_type: SchemaType,
        name: String,
    },
}

/// Versioned upsert/lookup of schema documents (component A). Out-of-scope
/// persistence (Postgres/Mongo) is expressed as another implementation of
/// this trait; the in-memory one below backs every test and single-process
/// deployment.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn upsert(
        &self,
        vendor: &str,
        component: &str,
        schema_type: SchemaType,
        name: &str,
        body: serde_json::Value,
        uploaded_by: &str,
    ) -> SchemaDocument;

    async fn find_latest(
        &self,
        vendor: &str,
        component: &str,
        schema_type: SchemaType,
        name: &str,
        max_version: Option<u32>,
    ) -> Option<SchemaDocument>;
}

struct KeyState {
    /// index 0 is version 1; versions are dense per the §3 invariant.
    versions: Vec<SchemaDocument>,
}

pub struct InMemorySchemaStore {
    keys: RwLock<HashMap<SchemaKey, Arc<Mutex<KeyState>>>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    async fn key_state(&self, key: &SchemaKey) -> Arc<Mutex<KeyState>> {
        if let Some(state) = self.keys.read().await.get(key) {
            return state.clone();
        }
        let mut keys = self.keys.write().await;
        keys.entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(KeyState { versions: Vec::new() })))
            .clone()
    }
}

impl Default for InMemorySchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn upsert(
        &self,
        vendor: &str,
        component: &str,
        schema_type: SchemaType,
        name: &str,
        body: serde_json::Value,
        uploaded_by: &str,
    ) -> SchemaDocument {
        let key = SchemaKey {
            vendor: vendor.to_string(),
            component: component.to_string(),
            schema_type,
            name: name.to_string(),
        };
        let state = self.key_state(&key).await;
        // Serializes concurrent upserts of the same key so version numbers
        // stay dense even under racing writers (§4.A, §5).
        let mut state = state.lock().await;

        if let Some(latest) = state.versions.last() {
            if latest.body == body {
                return latest.clone();
            }
        }

        let version = state.versions.len() as u32 + 1;
        let doc = SchemaDocument {
            vendor: vendor.to_string(),
            component: component.to_string(),
            schema_type,
            name: name.to_string(),
            version,
            body,
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Utc::now(),
        };
        state.versions.push(doc.clone());
        doc
    }

    async fn find_latest(
        &self,
        vendor: &str,
        component: &str,
        schema_type: SchemaType,
        name: &str,
        max_version: Option<u32>,
    ) -> Option<SchemaDocument> {
        let key = SchemaKey {
            vendor: vendor.to_string(),
            component: component.to_string(),
            schema_type,
            name: name.to_string(),
        };
        let keys = self.keys.read().await;
        let state = keys.get(&key)?;
        let state = state.lock().await;
        match max_version {
            None => state.versions.last().cloned(),
            Some(max) => state
                .versions
                .iter()
                .filter(|doc| doc.version <= max)
                .last()
                .cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn repeated_identical_upload_collapses_to_one_version() {
        let store = InMemorySchemaStore::new();
        let body = json!({"type": "object"});

        let first = store
            .upsert("mdstudio", "schema", SchemaType::Endpoint, "upload", body.clone(), "alice")
            .await;
        let second = store
            .upsert("mdstudio", "schema", SchemaType::Endpoint, "upload", body, "alice")
            .await;

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 1);
    }

    #[tokio::test]
    async fn differing_upload_creates_new_version() {
        let store = InMemorySchemaStore::new();
        store
            .upsert("v", "c", SchemaType::Endpoint, "n", json!({"a": 1}), "alice")
            .await;
        let second = store
            .upsert("v", "c", SchemaType::Endpoint, "n", json!({"a": 2}), "alice")
            .await;

        assert_eq!(second.version, 2);
        let latest = store
            .find_latest("v", "c", SchemaType::Endpoint, "n", None)
            .await
            .unwrap();
        assert_eq!(latest.version, 2);

        let v1 = store
            .find_latest("v", "c", SchemaType::Endpoint, "n", Some(1))
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
    }

    #[tokio::test]
    async fn find_latest_on_unknown_key_is_none() {
        let store = InMemorySchemaStore::new();
        assert!(store
            .find_latest("v", "c", SchemaType::Endpoint, "missing", None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_upserts_of_same_key_produce_dense_versions() {
        let store = Arc::new(InMemorySchemaStore::new());
        let mut handles = Vec::new();
        for i in 0..10u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert("v", "c", SchemaType::Endpoint, "n", json!({"i": i}), "alice")
                    .await
            }));
        }
        let mut versions: Vec<u32> = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap().version);
        }
        versions.sort();
        assert_eq!(versions, (1..=10).collect::<Vec<_>>());
    }
}
