//! Tests for the in-memory asset store

use super::*;
use serde_json::json;

fn asset(id: &str) -> AssetId {
    AssetId::new(id).unwrap()
}

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("test record must be an object"),
    }
}

fn seeded() -> InMemoryAssetStore {
    let store = InMemoryAssetStore::new();
    store.insert_file(
        &asset("42"),
        record(json!({ "type": "image/png", "tags": ["lathe"] })),
        Bytes::from_static(b"png"),
    );
    store
}

#[tokio::test]
async fn test_fetches_inserted_file() {
    let store = seeded();

    let metadata = store.fetch_metadata(&asset("42")).await.unwrap();
    assert_eq!(metadata.media_type.as_deref(), Some("image/png"));
    assert_eq!(metadata.tags, vec!["lathe"]);
    assert!(metadata.version.is_some());

    let bytes = store.fetch_binary(&asset("42")).await.unwrap();
    assert_eq!(bytes.as_ref(), b"png");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let store = InMemoryAssetStore::new();

    let error = store.fetch_metadata(&asset("nope")).await.unwrap_err();
    assert_eq!(error.status(), Some(404));
}

#[tokio::test]
async fn test_patch_markers_merges_body_and_bumps_version() {
    let store = seeded();
    let before = store.metadata(&asset("42")).unwrap().version;

    store
        .patch_markers(
            &asset("42"),
            &MarkerUpdate::Tags(vec!["lathe".to_string(), "watermarked_x".to_string()]),
        )
        .await
        .unwrap();

    let after = store.metadata(&asset("42")).unwrap();
    assert_eq!(after.tags, vec!["lathe", "watermarked_x"]);
    assert_ne!(after.version, before);
    assert_eq!(store.bytes(&asset("42")).unwrap().as_ref(), b"png");
}

#[tokio::test]
async fn test_patch_binary_replaces_bytes_and_notifies() {
    let store = seeded();
    let mut updates = store.subscribe_updates();

    store
        .patch_binary(
            &asset("42"),
            BinaryUpload {
                file_name: "lathe.jpg".to_string(),
                media_type: "image/jpeg".to_string(),
                bytes: Bytes::from_static(b"jpeg"),
            },
        )
        .await
        .unwrap();

    assert_eq!(store.bytes(&asset("42")).unwrap().as_ref(), b"jpeg");
    let metadata = store.metadata(&asset("42")).unwrap();
    assert_eq!(metadata.media_type.as_deref(), Some("image/jpeg"));
    assert_eq!(metadata.tags, vec!["lathe"]);
    assert_eq!(updates.try_recv().unwrap(), asset("42"));
}

#[tokio::test]
async fn test_marker_patch_notifies() {
    let store = seeded();
    let mut updates = store.subscribe_updates();

    store
        .patch_markers(&asset("42"), &MarkerUpdate::Tags(vec![]))
        .await
        .unwrap();

    assert_eq!(updates.try_recv().unwrap(), asset("42"));
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_patch_does_not_notify() {
    let store = seeded();
    let mut updates = store.subscribe_updates();
    store.fail_on(
        StoreOperation::PatchMarkers,
        StoreError::Status {
            operation: StoreOperation::PatchMarkers,
            resource: "files/42".to_string(),
            status: 500,
            message: "boom".to_string(),
        },
    );

    assert!(store
        .patch_markers(&asset("42"), &MarkerUpdate::Tags(vec![]))
        .await
        .is_err());
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_injected_failure_applies_until_cleared() {
    let store = seeded();
    store.fail_on(
        StoreOperation::FetchBinary,
        StoreError::Transport {
            operation: StoreOperation::FetchBinary,
            resource: "assets/42".to_string(),
            message: "connection reset".to_string(),
        },
    );

    assert!(store.fetch_binary(&asset("42")).await.is_err());
    assert!(store.fetch_metadata(&asset("42")).await.is_ok());

    store.clear_failure(StoreOperation::FetchBinary);
    assert!(store.fetch_binary(&asset("42")).await.is_ok());
}

#[tokio::test]
async fn test_call_log_counts_every_call() {
    let store = seeded();
    store.insert_record("product_images", "7", record(json!({ "image_file": "42" })));

    store.fetch_record("product_images", "7").await.unwrap();
    store.fetch_metadata(&asset("42")).await.unwrap();
    store
        .patch_markers(&asset("42"), &MarkerUpdate::Tags(vec![]))
        .await
        .unwrap();

    assert_eq!(store.calls().len(), 3);
    assert_eq!(store.calls()[0].resource, "items/product_images/7");
    assert_eq!(store.count(StoreOperation::FetchMetadata), 1);
    assert_eq!(store.write_count(), 1);
}
