//! # Consistency Buffer
//!
//! The CMS fires its webhook before every replica or cache behind its API
//! necessarily reflects the write that caused it. The buffer gives the store
//! time to settle before the pipeline reads metadata and bytes.
//!
//! Two strategies exist:
//!
//! - [`ConsistencyStrategy::Fixed`] sleeps for a configured delay.
//! - [`ConsistencyStrategy::Poll`] reads metadata until the version signal
//!   is identical on two consecutive reads, bounded by `max_polls`. A store
//!   that exposes no version signal gets the fixed delay instead.

use crate::store::{AssetStore, StoreError};
use crate::AssetId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// How the buffer waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyStrategy {
    #[default]
    Fixed,
    Poll,
}

/// Buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub strategy: ConsistencyStrategy,

    /// Fixed delay, and the fallback for stores without a version signal
    pub delay_ms: u64,

    /// Spacing between metadata reads when polling
    pub poll_interval_ms: u64,

    /// Upper bound on metadata reads when polling
    pub max_polls: u32,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            strategy: ConsistencyStrategy::Fixed,
            delay_ms: 5_000,
            poll_interval_ms: 500,
            max_polls: 10,
        }
    }
}

impl ConsistencyConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// How the wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Slept for the fixed delay
    Delayed,

    /// The version signal held still across two reads
    Stable { reads: u32 },

    /// The read bound ran out while the version kept changing
    Exhausted { reads: u32 },
}

/// Wait applied before the first fetch of a triggered run
#[derive(Debug, Clone)]
pub struct ConsistencyBuffer {
    config: ConsistencyConfig,
}

impl ConsistencyBuffer {
    pub fn new(config: ConsistencyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    /// Wait until the store is considered settled for `asset_id`
    pub async fn settle(
        &self,
        asset_id: &AssetId,
        store: &dyn AssetStore,
    ) -> Result<Settlement, StoreError> {
        match self.config.strategy {
            ConsistencyStrategy::Fixed => {
                self.sleep_fixed().await;
                Ok(Settlement::Delayed)
            }
            ConsistencyStrategy::Poll => self.poll(asset_id, store).await,
        }
    }

    async fn sleep_fixed(&self) {
        let delay = self.config.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn poll(
        &self,
        asset_id: &AssetId,
        store: &dyn AssetStore,
    ) -> Result<Settlement, StoreError> {
        let mut reads = 1;
        let mut previous = store.fetch_metadata(asset_id).await?.version;

        if previous.is_none() {
            debug!(asset_id = %asset_id, "Store exposes no version signal; using fixed delay");
            self.sleep_fixed().await;
            return Ok(Settlement::Delayed);
        }

        while reads < self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval()).await;

            let current = store.fetch_metadata(asset_id).await?.version;
            reads += 1;

            if current == previous {
                debug!(asset_id = %asset_id, reads, "Store settled");
                return Ok(Settlement::Stable { reads });
            }
            previous = current;
        }

        warn!(
            asset_id = %asset_id,
            reads,
            "Asset version still changing after poll bound; proceeding"
        );
        Ok(Settlement::Exhausted { reads })
    }
}

#[cfg(test)]
#[path = "consistency_tests.rs"]
mod tests;
