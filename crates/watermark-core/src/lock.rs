//! # Distributed Lock
//!
//! Per-asset mutex over a shared key-value store.
//!
//! Acquisition is a single set-if-absent with a TTL; it never waits. A second
//! delivery for an asset that is already being processed observes the held
//! key and gives up, so duplicates collapse instead of queueing.
//!
//! Release is an unconditional delete of the key. If the process dies while
//! holding a lock, the entry disappears when its TTL runs out.
//!
//! The TTL bounds the staleness of the entry, not the duration of the work.
//! Work that outlives the TTL can be duplicated by a later delivery. The
//! optional [`Heartbeat`] narrows that window by re-arming the TTL while the
//! holder is still working.

use crate::AssetId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// Core Trait
// ============================================================================

/// Key-value primitives the lock is built on
#[async_trait]
pub trait LockStore: Send + Sync {
    /// `SET key token NX EX ttl`; returns `true` if the key was created
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
        -> Result<bool, LockError>;

    /// `DEL key`
    async fn delete(&self, key: &str) -> Result<(), LockError>;

    /// Re-arm the TTL only if the key still holds `token`
    async fn extend_if_held(&self, key: &str, token: &str, ttl: Duration)
        -> Result<bool, LockError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), LockError>;
}

/// Lock store errors
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Lock store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Lock store command failed: {message}")]
    CommandFailed { message: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Lifetime of a lock entry in seconds
    pub ttl_seconds: u64,

    /// Key prefix; the asset id is appended
    pub key_prefix: String,

    /// Re-arm the TTL while the holder is still working
    pub heartbeat: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            ttl_seconds: 60,
            key_prefix: "processing:".to_string(),
            heartbeat: false,
        }
    }
}

impl LockConfig {
    /// Lifetime of a lock entry
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

// ============================================================================
// Lock
// ============================================================================

/// Proof of a successful acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub asset_id: AssetId,
    pub key: String,
    pub token: String,
}

/// Per-asset lock
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    config: LockConfig,
}

impl DistributedLock {
    /// Create a lock over a store
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Settings this lock was built with
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Key guarding an asset
    pub fn key_for(&self, asset_id: &AssetId) -> String {
        format!("{}{}", self.config.key_prefix, asset_id)
    }

    /// Try to take the lock without waiting
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub async fn acquire(&self, asset_id: &AssetId) -> Result<Option<LockLease>, LockError> {
        let key = self.key_for(asset_id);
        let token = Uuid::new_v4().to_string();

        let acquired = self
            .store
            .set_if_absent(&key, &token, self.config.ttl())
            .await?;

        if !acquired {
            debug!(asset_id = %asset_id, key = %key, "Lock already held");
            return Ok(None);
        }

        debug!(asset_id = %asset_id, key = %key, "Lock acquired");
        Ok(Some(LockLease {
            asset_id: asset_id.clone(),
            key,
            token,
        }))
    }

    /// Delete the lock entry
    ///
    /// The delete is unconditional: if the entry expired and was re-acquired
    /// by another holder, that holder's entry is removed too.
    pub async fn release(&self, lease: LockLease) -> Result<(), LockError> {
        self.store.delete(&lease.key).await?;
        debug!(asset_id = %lease.asset_id, key = %lease.key, "Lock released");
        Ok(())
    }

    /// Start re-arming the TTL, if enabled
    ///
    /// The ticker stops on its own when the entry no longer holds this lease's
    /// token.
    pub fn start_heartbeat(&self, lease: &LockLease) -> Option<Heartbeat> {
        if !self.config.heartbeat || self.config.ttl_seconds == 0 {
            return None;
        }

        let store = Arc::clone(&self.store);
        let ttl = self.config.ttl();
        let period = ttl / 3;
        let lease = lease.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match store.extend_if_held(&lease.key, &lease.token, ttl).await {
                    Ok(true) => debug!(asset_id = %lease.asset_id, "Lock TTL extended"),
                    Ok(false) => {
                        warn!(
                            asset_id = %lease.asset_id,
                            key = %lease.key,
                            "Lock no longer held by this run; stopping heartbeat"
                        );
                        break;
                    }
                    Err(e) => warn!(
                        asset_id = %lease.asset_id,
                        error = %e,
                        "Failed to extend lock TTL"
                    ),
                }
            }
        });

        Some(Heartbeat { handle })
    }

    /// Whether the lock store answers
    pub async fn is_reachable(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

/// Background TTL refresher, stopped on drop
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Stop refreshing
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
