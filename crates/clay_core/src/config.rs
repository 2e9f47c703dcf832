//! Storage engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::StorageEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix of every key the engine writes.
    ///
    /// With the default `clay`, records live at `clay:User:id:1`. An empty
    /// prefix gives the bare `User:id:1` form.
    pub key_prefix: String,

    /// How many times the persist lock is polled before giving up.
    pub lock_max_attempts: u32,

    /// Pause between two persist lock polls.
    pub lock_poll_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "clay".to_string(),
            lock_max_attempts: 1000,
            lock_poll_interval: Duration::from_millis(10),
        }
    }
}

impl StorageConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets how many times the persist lock is polled.
    #[must_use]
    pub const fn lock_max_attempts(mut self, attempts: u32) -> Self {
        self.lock_max_attempts = attempts;
        self
    }

    /// Sets the pause between persist lock polls.
    #[must_use]
    pub const fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }
}
