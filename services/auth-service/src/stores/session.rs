use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A login session record. Keyed by `(user_id, session_id)` throughout —
/// the original's mixed `uid`/`_id` naming for the same concept is resolved
/// to one canonical field, `user_id` (§4.F, Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: i64,
    pub realm: String,
    pub role: String,
    pub extra: serde_json::Value,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session);
    async fn find(&self, user_id: &str, session_id: i64) -> Option<Session>;
    async fn delete(&self, user_id: &str, session_id: i64);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<(String, i64), Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) {
        let key = (session.user_id.clone(), session.session_id);
        self.sessions.write().await.insert(key, session);
    }

    async fn find(&self, user_id: &str, session_id: i64) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(&(user_id.to_string(), session_id))
            .cloned()
    }

    async fn delete(&self, user_id: &str, session_id: i64) {
        self.sessions
            .write()
            .await
            .remove(&(user_id.to_string(), session_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            user_id: "alice".to_string(),
            session_id: 42,
            realm: "mdstudio".to_string(),
            role: "user".to_string(),
            extra: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_delete_removes_the_record() {
        let store = InMemorySessionStore::new();
        store.create(sample()).await;
        assert!(store.find("alice", 42).await.is_some());

        store.delete("alice", 42).await;
        assert!(store.find("alice", 42).await.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySessionStore::new();
        store.delete("ghost", 1).await;
        store.delete("ghost", 1).await;
    }
}
