//! # Watermark Core
//!
//! Core business logic for the asset watermark pipeline.
//!
//! The content store emits a webhook whenever an image asset is created or
//! modified. This crate turns that event into exactly one watermarked rewrite of
//! the asset, even though the rewrite itself makes the store emit the same
//! event again.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions ([`AssetStore`],
//!   [`LockStore`], [`Transform`])
//! - Infrastructure implementations live in [`adapters`] and are injected at
//!   process start
//! - The [`Dispatcher`] accepts raw trigger payloads, answers immediately and
//!   runs the [`Pipeline`] on a detached task
//!
//! ## Usage
//!
//! ```rust
//! use watermark_core::{AssetId, ContentDigest};
//!
//! let asset_id = AssetId::new("0b6c5e2a-8f7d-4c1e-9a3b-5d2f1e0c4b7a").unwrap();
//! let digest = ContentDigest::of(b"image bytes");
//! assert_eq!(digest.as_str().len(), 64);
//! # let _ = asset_id;
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier of an asset in the external content store
///
/// Asset ids are opaque to the pipeline. They are interpolated into store URLs
/// and lock keys, so path separators and whitespace are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Maximum accepted identifier length
    pub const MAX_LENGTH: usize = 128;

    /// Create new asset ID with validation
    ///
    /// # Validation Rules
    /// - Must be 1-128 characters
    /// - Must be printable ASCII without whitespace
    /// - Must not contain `/`, `?`, `#` or `%`
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "asset_id".to_string(),
            });
        }

        if value.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "asset_id".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "asset_id".to_string(),
                invalid_chars: "non-ASCII or whitespace".to_string(),
            });
        }

        if value.contains(['/', '?', '#', '%']) {
            return Err(ValidationError::InvalidCharacters {
                field: "asset_id".to_string(),
                invalid_chars: "URL path or query delimiters".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AssetId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.0
    }
}

/// Hex-encoded SHA-256 digest of an asset's binary payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the digest of a payload
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a digest previously rendered with [`ContentDigest::as_str`]
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidFormat {
                expected: "64 hexadecimal characters".to_string(),
                actual: value.to_string(),
            });
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Asset store abstraction and response types
pub mod store;

/// Per-asset distributed lock over a key-value store
pub mod lock;

/// Processed-content markers and the idempotency oracle
pub mod markers;

/// Trigger payload normalization
pub mod trigger;

/// Watermark rendering
pub mod transform;

/// Marker-then-binary write sequence
pub mod writer;

/// Eventual-consistency buffer applied before the first fetch
pub mod consistency;

/// Pipeline state machine
pub mod pipeline;

/// Webhook acceptance and detached execution
pub mod dispatcher;

/// Prometheus metrics recorded by the pipeline
pub mod metrics;

/// Infrastructure implementations of the store and lock interfaces
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{DirectusAssetStore, InMemoryAssetStore, InMemoryLockStore, RedisLockStore};
pub use consistency::{ConsistencyBuffer, ConsistencyConfig, ConsistencyStrategy};
pub use dispatcher::{Acceptance, AckStatus, Acknowledgement, Dispatcher};
pub use lock::{DistributedLock, LockConfig, LockError, LockLease, LockStore};
pub use markers::{MarkerStrategy, MarkerUpdate, MARKER_PREFIX};
pub use metrics::PipelineMetrics;
pub use pipeline::{
    Outcome, Pipeline, PipelineError, RetryPolicy, RunReport, SkipReason, Stage,
};
pub use store::{AssetMetadata, AssetStore, BinaryUpload, StoreConfig, StoreError, StoreOperation};
pub use transform::{Transform, TransformError, WatermarkConfig, Watermarker};
pub use trigger::{Resolution, TriggerConfig, TriggerError};
pub use writer::TwoPhaseWriter;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
