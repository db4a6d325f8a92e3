//! File-based Session Store Adapter
//!
//! Stores one YAML snapshot per user under a data directory. Handy for a
//! single-process deployment that should survive restarts, and easy to
//! inspect while debugging a conversation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::intake::Session;
use crate::ports::{SessionStore, SessionStoreError};

const EXTENSION: &str = "yaml";

/// Maps a user key to a file stem. Unsafe characters are percent-encoded so
/// distinct keys never share a file.
fn file_stem(user_id: &UserId) -> String {
    let mut stem = String::with_capacity(user_id.as_str().len());
    for byte in user_id.as_str().bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'@' => {
                stem.push(byte as char)
            }
            _ => stem.push_str(&format!("%{:02X}", byte)),
        }
    }
    stem
}

/// File-based storage for intake sessions
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_path: PathBuf,
}

impl FileSessionStore {
    /// Create a new file store rooted at `base_path`
    ///
    /// # Example
    /// ```ignore
    /// let store = FileSessionStore::new("./data/sessions");
    /// ```
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn session_path(&self, user_id: &UserId) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", file_stem(user_id), EXTENSION))
    }

    async fn ensure_dir(&self) -> Result<(), SessionStoreError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))
    }

    async fn read_session(path: &Path) -> Result<Session, SessionStoreError> {
        let yaml = fs::read_to_string(path)
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))?;
        serde_yaml::from_str(&yaml)
            .map_err(|e| SessionStoreError::DeserializationFailed(e.to_string()))
    }

    /// Paths of every snapshot in the directory
    async fn snapshot_paths(&self) -> Result<Vec<PathBuf>, SessionStoreError> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<Session>, SessionStoreError> {
        let path = self.session_path(user_id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_session(&path).await.map(Some)
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.ensure_dir().await?;

        let yaml = serde_yaml::to_string(session)
            .map_err(|e| SessionStoreError::SerializationFailed(e.to_string()))?;

        fs::write(self.session_path(&session.user_id), yaml)
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, SessionStoreError> {
        let path = self.session_path(user_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .map_err(|e| SessionStoreError::IoError(e.to_string()))?;
        Ok(true)
    }

    async fn evict_idle(&self, cutoff: Timestamp) -> Result<Vec<UserId>, SessionStoreError> {
        let mut evicted = Vec::new();
        for path in self.snapshot_paths().await? {
            let session = match Self::read_session(&path).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session snapshot");
                    continue;
                }
            };
            if session.last_activity_at.is_before(&cutoff) {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| SessionStoreError::IoError(e.to_string()))?;
                evicted.push(session.user_id);
            }
        }
        Ok(evicted)
    }

    async fn count(&self) -> Result<usize, SessionStoreError> {
        Ok(self.snapshot_paths().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intake::IntakePhase;
    use tempfile::TempDir;

    fn session(user: &str, at: Timestamp) -> Session {
        Session::new(UserId::new(user).unwrap(), "Ana", at)
    }

    #[tokio::test]
    async fn save_and_load_preserves_session() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut s = session("5511999990000@c.us", Timestamp::now());
        s.transition_to(IntakePhase::Identification);
        s.fields.fill_subject_name("João Silva Santos");
        s.record_exchange("oi", "Olá!", Timestamp::now());
        store.save(&s).await.unwrap();

        let loaded = store.load(&s.user_id).await.unwrap().unwrap();
        assert_eq!(loaded, s);
    }

    #[tokio::test]
    async fn missing_user_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("not-yet-created"));
        assert!(store
            .load(&UserId::new("ninguem").unwrap())
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let s = session("u-1", Timestamp::now());
        store.save(&s).await.unwrap();

        assert!(store.delete(&s.user_id).await.unwrap());
        assert!(!store.delete(&s.user_id).await.unwrap());
    }

    #[tokio::test]
    async fn evict_idle_removes_only_old_sessions() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let now = Timestamp::now();
        store.save(&session("old", now.minus_secs(7200))).await.unwrap();
        store.save(&session("new", now)).await.unwrap();

        let evicted = store.evict_idle(now.minus_secs(3600)).await.unwrap();

        assert_eq!(evicted, vec![UserId::new("old").unwrap()]);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_skipped_by_eviction() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(dir.path().join("broken.yaml"), "::: not yaml").unwrap();

        let evicted = store.evict_idle(Timestamp::now()).await.unwrap();
        assert!(evicted.is_empty());
    }

    #[test]
    fn file_stems_are_distinct_and_safe() {
        let a = file_stem(&UserId::new("a/b").unwrap());
        let b = file_stem(&UserId::new("a_b").unwrap());
        assert_ne!(a, b);
        assert_eq!(a, "a%2Fb");
        assert!(!a.contains('/'));
    }
}
