//! # Infrastructure Adapters
//!
//! Implementations of the asset store and lock store interfaces.

pub mod directus_store;
pub mod memory_lock;
pub mod memory_store;
pub mod redis_lock;

pub use directus_store::{DirectusAssetStore, StoreClientError};
pub use memory_lock::{InMemoryLockStore, LockCallCounts};
pub use memory_store::{InMemoryAssetStore, StoreCall};
pub use redis_lock::RedisLockStore;
