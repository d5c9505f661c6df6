use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub authid: String,
    pub password_hash: String,
    pub secret: Option<String>, // WAMP-CRA secret, present only for `authmethod=wampcra` users
    pub role: String,
    pub groups: Vec<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, authid: &str) -> Option<User>;
    async fn upsert(&self, user: User);
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find(&self, authid: &str) -> Option<User> {
        self.users.read().await.get(authid).cloned()
    }

    async fn upsert(&self, user: User) {
        self.users.write().await.insert(user.authid.clone(), user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let store = InMemoryUserStore::new();
        store
            .upsert(User {
                authid: "alice".to_string(),
                password_hash: "hash".to_string(),
                secret: None,
                role: "user".to_string(),
                groups: vec![],
            })
            .await;

        let found = store.find("alice").await.unwrap();
        assert_eq!(found.authid, "alice");
    }

    #[tokio::test]
    async fn unknown_authid_is_none() {
        let store = InMemoryUserStore::new();
        assert!(store.find("nobody").await.is_none());
    }
}
