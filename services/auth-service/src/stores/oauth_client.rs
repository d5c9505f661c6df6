use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An OAuth client registered under a user account, used for
/// client-credentials login and for the authorizer's OAuth ring (§4.D, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub owner_user_id: String,
    pub scopes: Vec<String>,
}

#[async_trait]
pub trait OAuthClientStore: Send + Sync {
    async fn create(&self, owner_user_id: &str, scopes: Vec<String>) -> OAuthClient;
    async fn find(&self, client_id: &str) -> Option<OAuthClient>;
    /// `oauth.client.getusername`: resolve the owning user for a client.
    async fn username_for(&self, client_id: &str) -> Option<String>;
}

#[derive(Default)]
pub struct InMemoryOAuthClientStore {
    clients: RwLock<HashMap<String, OAuthClient>>,
}

impl InMemoryOAuthClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthClientStore for InMemoryOAuthClientStore {
    async fn create(&self, owner_user_id: &str, scopes: Vec<String>) -> OAuthClient {
        let client = OAuthClient {
            client_id: Uuid::new_v4().to_string(),
            client_secret: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.to_string(),
            scopes,
        };
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client.clone());
        client
    }

    async fn find(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients.read().await.get(client_id).cloned()
    }

    async fn username_for(&self, client_id: &str) -> Option<String> {
        self.clients
            .read()
            .await
            .get(client_id)
            .map(|client| client.owner_user_id.clone())
    }
}
