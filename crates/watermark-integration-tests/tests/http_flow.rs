//! Integration tests driving the full stack through the HTTP router

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{asset, file_record, marker_tags, png_bytes, watermarker, CountingTransform, Fixture};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use watermark_api::create_router;

fn trigger(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/watermark")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Verify that a trigger is acknowledged before the detached run writes back
#[tokio::test]
async fn test_trigger_watermarks_asset_in_background() {
    let fixture = Fixture::new(CountingTransform::new(watermarker()));
    let id = asset("photo-1");
    fixture
        .store
        .insert_file(&id, file_record("image/png", &[]), png_bytes(96, 64, 7));
    let app = create_router(fixture.app_state());

    let response = app
        .clone()
        .oneshot(trigger(json!({ "event": "files.upload", "key": "photo-1" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        read_json(response).await,
        json!({ "status": "accepted", "assetId": "photo-1" })
    );

    let store = fixture.store.clone();
    wait_until(move || store.write_count() == 2).await;

    let stored = fixture.store.bytes(&id).unwrap();
    assert_eq!(&stored[..2], &[0xFF, 0xD8], "stored payload is a JPEG");
    assert_eq!(marker_tags(&fixture.store, &id).len(), 1);
    assert_eq!(
        fixture.store.metadata(&id).unwrap().filename.as_deref(),
        Some("upload.jpg")
    );
}

/// Verify that the echo of our own write is acknowledged but changes nothing
#[tokio::test]
async fn test_echoed_trigger_is_a_no_op() {
    let fixture = Fixture::new(CountingTransform::new(watermarker()));
    let id = asset("photo-2");
    fixture
        .store
        .insert_file(&id, file_record("image/png", &[]), png_bytes(64, 64, 11));
    let app = create_router(fixture.app_state());

    app.clone()
        .oneshot(trigger(json!({ "key": "photo-2" })))
        .await
        .unwrap();
    let store = fixture.store.clone();
    wait_until(move || store.write_count() == 2).await;
    let after_first = fixture.store.bytes(&id).unwrap();

    let response = app
        .clone()
        .oneshot(trigger(json!({ "key": "photo-2" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let registry = fixture.registry.clone();
    wait_until(move || {
        prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .map(|text| text.contains(r#"watermark_runs_total{outcome="skipped_already_processed"} 1"#))
            .unwrap_or(false)
    })
    .await;

    assert_eq!(fixture.renders(), 1);
    assert_eq!(fixture.store.write_count(), 2);
    assert_eq!(fixture.store.bytes(&id).unwrap(), after_first);
}

/// Verify that the metrics endpoint reports both HTTP and pipeline counters
#[tokio::test]
async fn test_metrics_endpoint_reports_outcomes() {
    let fixture = Fixture::new(CountingTransform::new(watermarker()));
    fixture.store.insert_file(
        &asset("doc"),
        file_record("application/pdf", &[]),
        bytes::Bytes::from_static(b"%PDF"),
    );
    let app = create_router(fixture.app_state());

    app.clone()
        .oneshot(trigger(json!({ "key": "doc" })))
        .await
        .unwrap();

    let registry = fixture.registry.clone();
    wait_until(move || {
        prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .map(|text| text.contains(r#"outcome="skipped_non_image""#))
            .unwrap_or(false)
    })
    .await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains(r#"webhook_requests_total{status="accepted"} 1"#));
    assert!(text.contains(r#"watermark_runs_total{outcome="skipped_non_image"} 1"#));
    assert_eq!(fixture.renders(), 0);
}

/// Verify that readiness tracks the lock store
#[tokio::test]
async fn test_readiness_tracks_lock_store() {
    let fixture = Fixture::new(CountingTransform::new(watermarker()));
    let app = create_router(fixture.app_state());

    fixture.locks.set_unavailable(true);
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(response).await["checks"]["lock_store"]["healthy"], false);
}
