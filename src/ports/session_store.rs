//! Session Store Port - Interface for persisting intake sessions.
//!
//! Sessions are keyed by user. The orchestrator serializes access per user,
//! so implementations only need to be safe for concurrent use across
//! different keys.

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::intake::Session;

/// Errors that can occur during session storage operations
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Failed to serialize session: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize session: {0}")]
    DeserializationFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Port for persisting and loading intake sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for a user, `None` when the user has none.
    async fn load(&self, user_id: &UserId) -> Result<Option<Session>, SessionStoreError>;

    /// Save (insert or replace) a session under its user.
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Delete a user's session. Returns true if one existed.
    async fn delete(&self, user_id: &UserId) -> Result<bool, SessionStoreError>;

    /// Remove every session whose last activity is before `cutoff`.
    ///
    /// # Returns
    /// The users whose sessions were removed
    async fn evict_idle(&self, cutoff: Timestamp) -> Result<Vec<UserId>, SessionStoreError>;

    /// Number of stored sessions
    async fn count(&self) -> Result<usize, SessionStoreError>;
}
