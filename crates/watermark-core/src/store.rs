//! # Asset Store Interface
//!
//! Abstraction over the external content store that owns the assets.
//!
//! The pipeline never creates or deletes assets. It reads metadata, the binary
//! payload and (for item-reference triggers) one referencing record, and it
//! writes back markers and a replacement binary as two independent patches.

use crate::markers::MarkerUpdate;
use crate::AssetId;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Media type that is never rasterizable even though it is in the image family
const VECTOR_IMAGE_TYPE: &str = "image/svg+xml";

// ============================================================================
// Core Trait
// ============================================================================

/// Interface for asset store operations
///
/// Reads must bypass any store-side or intermediary cache: the idempotency
/// oracle is only correct when it digests the bytes that are stored right now.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetch file metadata (media type, tags, custom fields)
    async fn fetch_metadata(&self, asset_id: &AssetId) -> Result<AssetMetadata, StoreError>;

    /// Fetch the binary payload, bypassing caches
    async fn fetch_binary(&self, asset_id: &AssetId) -> Result<Bytes, StoreError>;

    /// Fetch a record of an arbitrary collection
    ///
    /// Used only to resolve item-reference triggers to an asset id.
    async fn fetch_record(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Map<String, Value>, StoreError>;

    /// Replace the processed-content markers of a file
    async fn patch_markers(
        &self,
        asset_id: &AssetId,
        update: &MarkerUpdate,
    ) -> Result<(), StoreError>;

    /// Replace the binary payload of a file
    async fn patch_binary(&self, asset_id: &AssetId, upload: BinaryUpload)
        -> Result<(), StoreError>;
}

// ============================================================================
// Data Types
// ============================================================================

/// File metadata as reported by the store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetMetadata {
    /// Media type (`type` attribute)
    pub media_type: Option<String>,

    /// Free-text tags, in store order
    pub tags: Vec<String>,

    /// Original download file name
    pub filename: Option<String>,

    /// Version signal (`ETag` header, else `modified_on`)
    pub version: Option<String>,

    /// Every attribute of the file record, including custom fields
    pub fields: Map<String, Value>,
}

impl AssetMetadata {
    /// Build metadata from a file record
    ///
    /// A `tags` attribute that is missing, null or not an array is treated as
    /// an empty tag set; non-string entries are ignored.
    pub fn from_record(record: Map<String, Value>) -> Self {
        let media_type = record
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);

        let tags = match record.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let filename = record
            .get("filename_download")
            .and_then(Value::as_str)
            .map(str::to_string);

        let version = record
            .get("modified_on")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            media_type,
            tags,
            filename,
            version,
            fields: record,
        }
    }

    /// Whether the file belongs to the raster image family
    pub fn is_raster_image(&self) -> bool {
        match self.media_type.as_deref() {
            Some(media_type) => {
                let media_type = media_type.trim().to_ascii_lowercase();
                media_type.starts_with("image/") && !media_type.starts_with(VECTOR_IMAGE_TYPE)
            }
            None => false,
        }
    }

    /// Get a custom field value, treating JSON null as absent
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

/// Replacement binary for a file
#[derive(Clone, PartialEq)]
pub struct BinaryUpload {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl fmt::Debug for BinaryUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryUpload")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Asset store connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store API
    pub base_url: String,

    /// Static bearer token
    pub token: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8055".to_string(),
            token: None,
            request_timeout_seconds: 30,
            user_agent: concat!("asset-watermark/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Store operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FetchMetadata,
    FetchBinary,
    FetchRecord,
    PatchMarkers,
    PatchBinary,
}

impl StoreOperation {
    /// Whether the operation mutates the store
    pub fn is_write(&self) -> bool {
        matches!(self, Self::PatchMarkers | Self::PatchBinary)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchMetadata => "fetch_metadata",
            Self::FetchBinary => "fetch_binary",
            Self::FetchRecord => "fetch_record",
            Self::PatchMarkers => "patch_markers",
            Self::PatchBinary => "patch_binary",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store answered with a non-success status
    #[error("{operation} on {resource} returned HTTP {status}: {message}")]
    Status {
        operation: StoreOperation,
        resource: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response
    #[error("{operation} on {resource} failed: {message}")]
    Transport {
        operation: StoreOperation,
        resource: String,
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("{operation} on {resource} returned an unreadable body: {message}")]
    Decode {
        operation: StoreOperation,
        resource: String,
        message: String,
    },
}

impl StoreError {
    /// Operation that failed
    pub fn operation(&self) -> StoreOperation {
        match self {
            Self::Status { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. } => *operation,
        }
    }

    /// HTTP status, if the store answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Transport { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
