//! Common test utilities for the watermark integration tests
//!
//! This module provides:
//! - Transform doubles that count invocations
//! - Builders for pipelines, dispatchers and router state over in-memory
//!   adapters
//! - Test image and file record builders

#![allow(dead_code)]

use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgba};
use prometheus::Registry;
use serde_json::{json, Map, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use watermark_api::{AppState, ServiceConfig};
use watermark_core::{
    AssetId, ConsistencyConfig, Dispatcher, DistributedLock, InMemoryAssetStore,
    InMemoryLockStore, LockConfig, MarkerStrategy, Pipeline, PipelineMetrics, Transform,
    TransformError, TriggerConfig, WatermarkConfig, Watermarker,
};

// ============================================================================
// Transform doubles
// ============================================================================

/// Wraps a transform and counts how often it renders
pub struct CountingTransform {
    inner: Arc<dyn Transform>,
    renders: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingTransform {
    pub fn new(inner: Arc<dyn Transform>) -> Self {
        Self {
            inner,
            renders: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Block inside `render` for `delay`, to keep a run in the transforming stage
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }
}

impl Transform for CountingTransform {
    fn render(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.render(input)
    }

    fn output_media_type(&self) -> &str {
        self.inner.output_media_type()
    }

    fn output_extension(&self) -> &str {
        self.inner.output_extension()
    }
}

/// Appends a fixed suffix; cheap stand-in for the real renderer
pub struct SuffixTransform;

impl Transform for SuffixTransform {
    fn render(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut output = input.to_vec();
        output.extend_from_slice(b"::watermarked");
        Ok(output)
    }
}

/// The production renderer with its default text layout
pub fn watermarker() -> Arc<dyn Transform> {
    Arc::new(Watermarker::new(WatermarkConfig {
        font_paths: Vec::new(),
        ..WatermarkConfig::default()
    }))
}

// ============================================================================
// Fixtures
// ============================================================================

/// In-memory adapters and the pipeline built over them
pub struct Fixture {
    pub store: InMemoryAssetStore,
    pub locks: InMemoryLockStore,
    pub renders: Arc<AtomicUsize>,
    pub registry: Registry,
    pub pipeline: Arc<Pipeline>,
}

impl Fixture {
    pub fn new(transform: CountingTransform) -> Self {
        Self::with_markers(transform, MarkerStrategy::Tags)
    }

    pub fn with_markers(transform: CountingTransform, markers: MarkerStrategy) -> Self {
        let store = InMemoryAssetStore::new();
        let locks = InMemoryLockStore::new();
        let registry = Registry::new();
        let renders = transform.counter();

        let pipeline = Pipeline::new(
            Arc::new(store.clone()),
            DistributedLock::new(Arc::new(locks.clone()), LockConfig::default()),
            Arc::new(transform),
            markers,
            ConsistencyConfig {
                delay_ms: 0,
                ..ConsistencyConfig::default()
            },
            PipelineMetrics::new(&registry).expect("pipeline metrics register"),
        );

        Self {
            store,
            locks,
            renders,
            registry,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.pipeline), TriggerConfig::default())
    }

    /// Router state sharing this fixture's pipeline and registry
    pub fn app_state(&self) -> AppState {
        AppState::new(
            ServiceConfig::default(),
            self.dispatcher(),
            self.registry.clone(),
        )
        .expect("service metrics register")
    }
}

pub fn asset(id: &str) -> AssetId {
    AssetId::new(id).expect("valid asset id")
}

/// File record with the given media type and tags
pub fn file_record(media_type: &str, tags: &[&str]) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("type".to_string(), json!(media_type));
    record.insert("tags".to_string(), json!(tags));
    record.insert("filename_download".to_string(), json!("upload.png"));
    record
}

/// Small PNG with a colour derived from `seed`
pub fn png_bytes(width: u32, height: u32, seed: u8) -> Bytes {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([
            seed,
            (x % 256) as u8,
            (y % 256) as u8,
            255,
        ])
    });

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("png encodes");
    Bytes::from(out.into_inner())
}

/// Replace the stored binary as a user upload would, keeping the record's tags
pub fn reupload(store: &InMemoryAssetStore, asset_id: &AssetId, bytes: Bytes) {
    let mut record = store
        .metadata(asset_id)
        .expect("asset exists")
        .fields;
    record.insert("type".to_string(), json!("image/png"));
    record.remove("modified_on");
    store.insert_file(asset_id, record, bytes);
}

/// Tags of the stored file that are processed-content markers
pub fn marker_tags(store: &InMemoryAssetStore, asset_id: &AssetId) -> Vec<String> {
    store
        .metadata(asset_id)
        .expect("asset exists")
        .tags
        .into_iter()
        .filter(|t| t.starts_with(watermark_core::MARKER_PREFIX))
        .collect()
}
