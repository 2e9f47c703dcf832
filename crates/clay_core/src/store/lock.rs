//! Advisory persist lock.
//!
//! The lock is a plain key written with `SET NX`; whoever wrote it holds
//! it until the key is deleted. It is cooperative: only persists take it,
//! and a holder that dies without releasing wedges the model until the key
//! is deleted by hand.

use crate::config::StorageConfig;
use crate::error::{CoreError, CoreResult};
use clay_storage::KeyValueBackend;
use std::thread;

/// Holds one or more lock keys; releases them all when dropped.
pub(crate) struct PersistLock<'a> {
    backend: &'a dyn KeyValueBackend,
    held: Vec<String>,
}

impl<'a> PersistLock<'a> {
    /// Acquires every key in order, polling each one.
    ///
    /// Keys must already be sorted so two batches never wait on each other
    /// in opposite order. On failure the keys taken so far are released.
    pub(crate) fn acquire(
        backend: &'a dyn KeyValueBackend,
        keys: Vec<String>,
        config: &StorageConfig,
    ) -> CoreResult<Self> {
        let mut lock = Self {
            backend,
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            lock.acquire_one(&key, config)?;
            lock.held.push(key);
        }
        Ok(lock)
    }

    fn acquire_one(&self, key: &str, config: &StorageConfig) -> CoreResult<()> {
        let attempts = config.lock_max_attempts.max(1);
        for attempt in 1..=attempts {
            let marker = chrono::Utc::now().to_rfc2822();
            if self.backend.set_if_absent(key, &marker)? {
                tracing::trace!(key, attempt, "acquired persist lock");
                return Ok(());
            }
            if attempt < attempts {
                thread::sleep(config.lock_poll_interval);
            }
        }
        tracing::warn!(key, attempts, "persist lock timed out");
        Err(CoreError::LockTimeout {
            key: key.to_string(),
            attempts,
        })
    }
}

impl Drop for PersistLock<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        if let Err(error) = self.backend.delete(&self.held) {
            tracing::error!(keys = ?self.held, %error, "failed to release persist lock");
        }
    }
}
