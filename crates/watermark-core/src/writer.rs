//! # Two-Phase Writer
//!
//! Writes rendered content back as two independent patches: markers first,
//! then the binary. The store offers no transaction spanning both.
//!
//! Between the two patches the asset carries the new marker over the old
//! bytes. That window is harmless: a trigger observed during it digests the
//! old bytes, finds no matching marker and re-renders, which only costs work.
//! If the marker patch fails, the binary patch is never sent.

use crate::markers::MarkerStrategy;
use crate::store::{AssetMetadata, AssetStore, BinaryUpload, StoreError};
use crate::{AssetId, ContentDigest};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Marker-then-binary writer
#[derive(Clone)]
pub struct TwoPhaseWriter {
    store: Arc<dyn AssetStore>,
    markers: MarkerStrategy,
}

impl TwoPhaseWriter {
    pub fn new(store: Arc<dyn AssetStore>, markers: MarkerStrategy) -> Self {
        Self { store, markers }
    }

    /// Marker strategy used for the first patch
    pub fn markers(&self) -> &MarkerStrategy {
        &self.markers
    }

    /// Write `rendered` and its marker; returns the digest of `rendered`
    pub async fn apply(
        &self,
        asset_id: &AssetId,
        metadata: &AssetMetadata,
        rendered: Bytes,
        media_type: &str,
        extension: &str,
    ) -> Result<ContentDigest, StoreError> {
        let digest = ContentDigest::of(&rendered);
        let update = self.markers.next_update(metadata, &digest);

        self.store.patch_markers(asset_id, &update).await?;
        debug!(asset_id = %asset_id, digest = %digest, "Markers written");

        let upload = BinaryUpload {
            file_name: output_file_name(asset_id, metadata.filename.as_deref(), extension),
            media_type: media_type.to_string(),
            bytes: rendered,
        };
        self.store.patch_binary(asset_id, upload).await?;

        info!(asset_id = %asset_id, digest = %digest, "Watermarked binary written");
        Ok(digest)
    }
}

/// Original file stem with the output extension, else the asset id
fn output_file_name(asset_id: &AssetId, original: Option<&str>, extension: &str) -> String {
    let stem = original
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match stem {
        Some(stem) => format!("{}.{}", stem, extension),
        None => format!("{}.{}", asset_id, extension),
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
