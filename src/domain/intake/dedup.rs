//! Repeated-message suppression.

use std::time::Duration;

use super::session::Session;
use crate::domain::foundation::Timestamp;

/// Default window within which an identical message is answered from cache.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Replays the stored answer when the same text arrives again within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    window: Duration,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the cached answer if `text` repeats the last question
    /// strictly inside the window.
    pub fn check(&self, session: &Session, text: &str, now: Timestamp) -> Option<String> {
        let last = session.last_exchange.as_ref()?;
        if last.question != text {
            return None;
        }
        if now.elapsed_since(&last.at) < self.window {
            Some(last.answer.clone())
        } else {
            None
        }
    }
}
