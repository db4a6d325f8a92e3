//! Session timing configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::IntakeSettings;

/// Session timing and administration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Identical messages inside this window replay the stored reply
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Gap after which complete counterpart data is re-confirmed
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Sessions idle for longer than this are evicted
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// Time between eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upper bound on each completion and classification call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Ask the classifier for a topic when keywords find none
    #[serde(default = "default_topic_fallback")]
    pub topic_llm_fallback: bool,

    /// Key for the `!reset` command
    pub admin_key: Option<Secret<String>>,
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Orchestrator settings derived from this section
    pub fn intake_settings(&self) -> IntakeSettings {
        IntakeSettings {
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            stale_after: Duration::from_secs(self.stale_after_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            idle_ttl: Duration::from_secs(self.idle_ttl_secs),
            topic_fallback: self.topic_llm_fallback,
            admin_key: self
                .admin_key
                .as_ref()
                .map(|k| k.expose_secret().trim().to_string()),
        }
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.call_timeout_secs == 0 || self.call_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout("session.call_timeout_secs"));
        }
        if self.idle_ttl_secs == 0 {
            return Err(ValidationError::InvalidTimeout("session.idle_ttl_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout("session.sweep_interval_secs"));
        }
        if self.stale_after_secs <= self.dedup_window_secs {
            return Err(ValidationError::StaleBeforeDedup);
        }
        if let Some(key) = &self.admin_key {
            if key.expose_secret().trim().is_empty() {
                return Err(ValidationError::BlankAdminKey);
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window(),
            stale_after_secs: default_stale_after(),
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            call_timeout_secs: default_call_timeout(),
            topic_llm_fallback: default_topic_fallback(),
            admin_key: None,
        }
    }
}

fn default_dedup_window() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    120
}

fn default_idle_ttl() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

fn default_call_timeout() -> u64 {
    30
}

fn default_topic_fallback() -> bool {
    false
}
