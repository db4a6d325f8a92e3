//! IdleSweeper - background eviction of abandoned intake sessions.
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 1h | How often to look for idle sessions |
//!
//! The idle threshold itself is the orchestrator's `idle_ttl`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error};

use super::orchestrator::{IntakeError, IntakeOrchestrator};
use crate::domain::foundation::Timestamp;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically evicts sessions idle for longer than the configured TTL.
pub struct IdleSweeper {
    orchestrator: Arc<IntakeOrchestrator>,
    interval: Duration,
}

impl IdleSweeper {
    pub fn new(orchestrator: Arc<IntakeOrchestrator>) -> Self {
        Self::with_interval(orchestrator, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_interval(orchestrator: Arc<IntakeOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Runs until the shutdown flag flips to `true` or its sender goes away.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("idle sweeper stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "idle sweep failed");
                    }
                }
            }
        }
    }

    /// One eviction pass. Returns how many sessions were removed.
    pub async fn sweep_once(&self) -> Result<usize, IntakeError> {
        let evicted = self.orchestrator.evict_idle(Timestamp::now()).await?;
        Ok(evicted.len())
    }
}
