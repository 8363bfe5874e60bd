//! # In-Memory Lock Store
//!
//! Thread-safe in-memory implementation of [`LockStore`] for testing and
//! single-process development. Expiry uses `tokio::time::Instant`, so tests
//! running under a paused clock can advance past a TTL deterministically.

use crate::lock::{LockError, LockStore};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

/// Number of calls per lock store primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockCallCounts {
    pub set_if_absent: usize,
    pub delete: usize,
    pub extend_if_held: usize,
    pub ping: usize,
}

impl LockCallCounts {
    /// Total calls of any kind
    pub fn total(&self) -> usize {
        self.set_if_absent + self.delete + self.extend_if_held + self.ping
    }
}

/// In-memory lock store
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    calls: Arc<Mutex<LockCallCounts>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLockStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`LockError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Token currently holding `key`, ignoring expired entries
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.token.clone())
    }

    /// Remaining lifetime of `key`
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    /// Snapshot of call counts
    pub fn calls(&self) -> LockCallCounts {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, update: impl FnOnce(&mut LockCallCounts)) -> Result<(), LockError> {
        update(&mut self.calls.lock().unwrap_or_else(PoisonError::into_inner));
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Unavailable {
                message: "in-memory lock store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        self.record(|c| c.set_if_absent += 1)?;

        let now = Instant::now();
        let mut entries = self.entries();
        if entries.get(key).is_some_and(|e| e.expires_at > now) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), LockError> {
        self.record(|c| c.delete += 1)?;
        self.entries().remove(key);
        Ok(())
    }

    async fn extend_if_held(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        self.record(|c| c.extend_if_held += 1)?;

        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.token == token && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), LockError> {
        self.record(|c| c.ping += 1)
    }
}

#[cfg(test)]
#[path = "memory_lock_tests.rs"]
mod tests;
