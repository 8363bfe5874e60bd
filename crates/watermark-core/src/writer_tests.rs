//! Tests for the marker-then-binary write sequence

use super::*;
use crate::adapters::InMemoryAssetStore;
use crate::markers::marker_for;
use crate::store::StoreOperation;
use serde_json::{json, Map, Value};

fn asset() -> AssetId {
    AssetId::new("42").unwrap()
}

fn seeded(tags: Value) -> InMemoryAssetStore {
    let store = InMemoryAssetStore::new();
    let mut record = Map::new();
    record.insert("type".to_string(), json!("image/png"));
    record.insert("tags".to_string(), tags);
    record.insert("filename_download".to_string(), json!("lathe.png"));
    store.insert_file(&asset(), record, Bytes::from_static(b"original"));
    store
}

#[tokio::test]
async fn test_writes_markers_then_binary() {
    let store = seeded(json!(["lathe"]));
    let writer = TwoPhaseWriter::new(Arc::new(store.clone()), MarkerStrategy::Tags);
    let metadata = store.metadata(&asset()).unwrap();

    let digest = writer
        .apply(&asset(), &metadata, Bytes::from_static(b"rendered"), "image/jpeg", "jpg")
        .await
        .unwrap();

    assert_eq!(digest, ContentDigest::of(b"rendered"));
    let operations: Vec<StoreOperation> = store.calls().iter().map(|c| c.operation).collect();
    assert_eq!(
        operations,
        vec![StoreOperation::PatchMarkers, StoreOperation::PatchBinary]
    );

    let after = store.metadata(&asset()).unwrap();
    assert_eq!(after.tags, vec!["lathe".to_string(), marker_for(&digest)]);
    assert_eq!(after.filename.as_deref(), Some("lathe.jpg"));
    assert_eq!(after.media_type.as_deref(), Some("image/jpeg"));
    assert_eq!(store.bytes(&asset()).unwrap().as_ref(), b"rendered");
}

#[tokio::test]
async fn test_marker_failure_skips_binary_patch() {
    let store = seeded(json!([]));
    store.fail_on(
        StoreOperation::PatchMarkers,
        StoreError::Status {
            operation: StoreOperation::PatchMarkers,
            resource: "files/42".to_string(),
            status: 403,
            message: "forbidden".to_string(),
        },
    );
    let writer = TwoPhaseWriter::new(Arc::new(store.clone()), MarkerStrategy::Tags);
    let metadata = store.metadata(&asset()).unwrap();

    let error = writer
        .apply(&asset(), &metadata, Bytes::from_static(b"rendered"), "image/jpeg", "jpg")
        .await
        .unwrap_err();

    assert_eq!(error.operation(), StoreOperation::PatchMarkers);
    assert_eq!(store.count(StoreOperation::PatchBinary), 0);
    assert_eq!(store.bytes(&asset()).unwrap().as_ref(), b"original");
}

#[tokio::test]
async fn test_binary_failure_leaves_marker_written() {
    let store = seeded(json!([]));
    store.fail_on(
        StoreOperation::PatchBinary,
        StoreError::Transport {
            operation: StoreOperation::PatchBinary,
            resource: "files/42".to_string(),
            message: "reset".to_string(),
        },
    );
    let writer = TwoPhaseWriter::new(Arc::new(store.clone()), MarkerStrategy::Tags);
    let metadata = store.metadata(&asset()).unwrap();

    let error = writer
        .apply(&asset(), &metadata, Bytes::from_static(b"rendered"), "image/jpeg", "jpg")
        .await
        .unwrap_err();

    assert_eq!(error.operation(), StoreOperation::PatchBinary);
    // The marker names bytes that never landed, so the next trigger re-renders
    let after = store.metadata(&asset()).unwrap();
    assert!(!MarkerStrategy::Tags
        .is_already_processed(&after, &ContentDigest::of(&store.bytes(&asset()).unwrap())));
}

#[tokio::test]
async fn test_field_strategy_patches_field_only() {
    let store = seeded(json!(["keep"]));
    let strategy = MarkerStrategy::Field {
        name: "last_processed_digest".to_string(),
    };
    let writer = TwoPhaseWriter::new(Arc::new(store.clone()), strategy);
    let metadata = store.metadata(&asset()).unwrap();

    let digest = writer
        .apply(&asset(), &metadata, Bytes::from_static(b"rendered"), "image/jpeg", "jpg")
        .await
        .unwrap();

    let after = store.metadata(&asset()).unwrap();
    assert_eq!(after.tags, vec!["keep"]);
    assert_eq!(
        after.field("last_processed_digest"),
        Some(&json!(digest.as_str()))
    );
}

#[tokio::test]
async fn test_field_strategy_drops_legacy_marker_tags() {
    let store = seeded(json!(["keep", "watermarked_0123", "hero"]));
    let strategy = MarkerStrategy::Field {
        name: "last_processed_digest".to_string(),
    };
    let writer = TwoPhaseWriter::new(Arc::new(store.clone()), strategy);
    let metadata = store.metadata(&asset()).unwrap();

    let digest = writer
        .apply(&asset(), &metadata, Bytes::from_static(b"rendered"), "image/jpeg", "jpg")
        .await
        .unwrap();

    let after = store.metadata(&asset()).unwrap();
    assert_eq!(after.tags, vec!["keep", "hero"]);
    assert_eq!(
        after.field("last_processed_digest"),
        Some(&json!(digest.as_str()))
    );
}

#[test]
fn test_output_file_name() {
    let id = asset();
    assert_eq!(output_file_name(&id, Some("lathe.png"), "jpg"), "lathe.jpg");
    assert_eq!(output_file_name(&id, Some("archive.tar.gz"), "jpg"), "archive.tar.jpg");
    assert_eq!(output_file_name(&id, Some("noext"), "jpg"), "noext.jpg");
    assert_eq!(output_file_name(&id, None, "jpg"), "42.jpg");
    assert_eq!(output_file_name(&id, Some(""), "jpg"), "42.jpg");
}
