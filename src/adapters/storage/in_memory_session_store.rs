//! In-Memory Session Store Adapter
//!
//! Keeps sessions in a map behind an async lock. The default backend: the
//! intake bot is a single process and idle sessions are swept anyway.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::intake::Session;
use crate::ports::{SessionStore, SessionStoreError};

/// In-memory storage for intake sessions
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<UserId, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored sessions (useful for tests)
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.sessions
            .write()
            .await
            .insert(session.user_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, SessionStoreError> {
        Ok(self.sessions.write().await.remove(user_id).is_some())
    }

    async fn evict_idle(&self, cutoff: Timestamp) -> Result<Vec<UserId>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let idle: Vec<UserId> = sessions
            .values()
            .filter(|s| s.last_activity_at.is_before(&cutoff))
            .map(|s| s.user_id.clone())
            .collect();
        for user_id in &idle {
            sessions.remove(user_id);
        }
        Ok(idle)
    }

    async fn count(&self) -> Result<usize, SessionStoreError> {
        Ok(self.sessions.read().await.len())
    }
}
