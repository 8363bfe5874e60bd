//! # Processed-Content Markers
//!
//! A marker records the digest of the bytes that were stored when the asset
//! was last watermarked. The oracle compares it with the digest of the bytes
//! stored *now*:
//!
//! - equal: the current content is our own output, so the trigger is the echo
//!   of our own write (or a duplicate delivery) and must be ignored
//! - different or absent: the content is new and must be watermarked
//!
//! Two encodings are supported. [`MarkerStrategy::Tags`] keeps
//! `watermarked_<digest>` entries in the file's free-text tag array;
//! [`MarkerStrategy::Field`] stores the bare digest in a dedicated field of the
//! file record. It still honours legacy tags when reading and clears them on
//! the next write, so a stale tag can never outlive the field.

use crate::store::AssetMetadata;
use crate::ContentDigest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Prefix of processed-content tags
pub const MARKER_PREFIX: &str = "watermarked_";

/// Render the tag for a digest
pub fn marker_for(digest: &ContentDigest) -> String {
    format!("{}{}", MARKER_PREFIX, digest)
}

/// Whether a tag is a processed-content marker of any digest
pub fn is_marker(tag: &str) -> bool {
    tag.starts_with(MARKER_PREFIX)
}

/// Where the processed-content marker is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MarkerStrategy {
    /// `watermarked_<digest>` entries in the `tags` array
    Tags,

    /// Bare digest in a dedicated field of the file record
    Field { name: String },
}

impl Default for MarkerStrategy {
    fn default() -> Self {
        Self::Tags
    }
}

impl MarkerStrategy {
    /// Check whether the stored content is already our own output
    pub fn is_already_processed(&self, metadata: &AssetMetadata, digest: &ContentDigest) -> bool {
        let tagged = metadata.tags.iter().any(|t| *t == marker_for(digest));

        match self {
            Self::Tags => tagged,
            Self::Field { name } => {
                let recorded = metadata
                    .field(name)
                    .and_then(Value::as_str)
                    .and_then(|v| ContentDigest::parse(v).ok())
                    .is_some_and(|recorded| recorded == *digest);
                recorded || tagged
            }
        }
    }

    /// Compute the marker write for freshly rendered content
    ///
    /// Every existing marker tag is dropped and unrelated tags keep their
    /// order. The tag strategy then appends the single new marker; the field
    /// strategy only rewrites the tag array when it had markers to drop.
    pub fn next_update(&self, metadata: &AssetMetadata, digest: &ContentDigest) -> MarkerUpdate {
        match self {
            Self::Tags => {
                let mut tags = unmarked_tags(metadata);
                tags.push(marker_for(digest));
                MarkerUpdate::Tags(tags)
            }
            Self::Field { name } => {
                let has_legacy = metadata.tags.iter().any(|t| is_marker(t));
                MarkerUpdate::Field {
                    name: name.clone(),
                    digest: digest.clone(),
                    tags: has_legacy.then(|| unmarked_tags(metadata)),
                }
            }
        }
    }
}

fn unmarked_tags(metadata: &AssetMetadata) -> Vec<String> {
    metadata
        .tags
        .iter()
        .filter(|t| !is_marker(t))
        .cloned()
        .collect()
}

/// Marker write sent to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerUpdate {
    /// Replace the whole tag array
    Tags(Vec<String>),

    /// Set a single field to the digest, replacing the tag array when legacy
    /// marker tags have to go
    Field {
        name: String,
        digest: ContentDigest,
        tags: Option<Vec<String>>,
    },
}

impl MarkerUpdate {
    /// JSON body of the metadata patch
    pub fn to_patch_body(&self) -> Value {
        match self {
            Self::Tags(tags) => json!({ "tags": tags }),
            Self::Field { name, digest, tags } => {
                let mut body = serde_json::Map::new();
                body.insert(name.clone(), Value::String(digest.to_string()));
                if let Some(tags) = tags {
                    body.insert("tags".to_string(), json!(tags));
                }
                Value::Object(body)
            }
        }
    }
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
