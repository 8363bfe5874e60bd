//! # In-Memory Asset Store
//!
//! [`AssetStore`] held entirely in process memory, for tests and local runs.
//!
//! Besides storing files and records it keeps a log of every call, lets a
//! test inject a failure for a given operation, and can publish the id of
//! every file after each successful patch. The last one mirrors a CMS that fires
//! an update webhook for its own writes, which is what makes loop termination
//! observable in tests.

use crate::markers::MarkerUpdate;
use crate::store::{AssetMetadata, AssetStore, BinaryUpload, StoreError, StoreOperation};
use crate::AssetId;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: StoreOperation,
    pub resource: String,
}

#[derive(Debug, Clone)]
struct StoredFile {
    record: Map<String, Value>,
    bytes: Bytes,
}

#[derive(Default)]
struct State {
    files: HashMap<String, StoredFile>,
    records: HashMap<(String, String), Map<String, Value>>,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOperation, StoreError>,
    updates: Option<mpsc::UnboundedSender<AssetId>>,
    revision: u64,
}

impl State {
    fn publish(&self, asset_id: &AssetId) {
        if let Some(updates) = &self.updates {
            // A closed receiver just means nobody is listening any more
            let _ = updates.send(asset_id.clone());
        }
    }
}

/// In-memory asset store
#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryAssetStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a file
    ///
    /// `record` holds the file attributes (`type`, `tags`, custom fields).
    /// The `id` attribute is set from `asset_id`.
    pub fn insert_file(&self, asset_id: &AssetId, mut record: Map<String, Value>, bytes: Bytes) {
        record.insert("id".to_string(), Value::String(asset_id.to_string()));
        let mut state = self.state();
        state.revision += 1;
        record
            .entry("modified_on".to_string())
            .or_insert_with(|| Value::String(format!("rev-{}", state.revision)));
        state
            .files
            .insert(asset_id.to_string(), StoredFile { record, bytes });
    }

    /// Add or replace a record of an arbitrary collection
    pub fn insert_record(&self, collection: &str, key: &str, record: Map<String, Value>) {
        self.state()
            .records
            .insert((collection.to_string(), key.to_string()), record);
    }

    /// Current metadata of a file
    pub fn metadata(&self, asset_id: &AssetId) -> Option<AssetMetadata> {
        self.state()
            .files
            .get(asset_id.as_str())
            .map(|f| AssetMetadata::from_record(f.record.clone()))
    }

    /// Current binary of a file
    pub fn bytes(&self, asset_id: &AssetId) -> Option<Bytes> {
        self.state()
            .files
            .get(asset_id.as_str())
            .map(|f| f.bytes.clone())
    }

    /// Make every call of `operation` fail with `error` until cleared
    pub fn fail_on(&self, operation: StoreOperation, error: StoreError) {
        self.state().failures.insert(operation, error);
    }

    /// Remove an injected failure
    pub fn clear_failure(&self, operation: StoreOperation) {
        self.state().failures.remove(&operation);
    }

    /// Receive the id of every file patched from now on
    ///
    /// Both marker and binary patches publish, mirroring the update event a
    /// content store emits for each write.
    ///
    /// Only the most recent subscriber receives updates.
    pub fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<AssetId> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().updates = Some(tx);
        rx
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of calls of one operation
    pub fn count(&self, operation: StoreOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Number of mutating calls
    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation.is_write())
            .count()
    }

    fn begin(
        &self,
        operation: StoreOperation,
        resource: String,
    ) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.state();
        state.calls.push(StoreCall {
            operation,
            resource,
        });
        match state.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }
}

fn not_found(operation: StoreOperation, resource: String) -> StoreError {
    StoreError::Status {
        operation,
        resource,
        status: 404,
        message: "not found".to_string(),
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn fetch_metadata(&self, asset_id: &AssetId) -> Result<AssetMetadata, StoreError> {
        let operation = StoreOperation::FetchMetadata;
        let resource = format!("files/{}", asset_id);
        let state = self.begin(operation, resource.clone())?;

        state
            .files
            .get(asset_id.as_str())
            .map(|f| AssetMetadata::from_record(f.record.clone()))
            .ok_or_else(|| not_found(operation, resource))
    }

    async fn fetch_binary(&self, asset_id: &AssetId) -> Result<Bytes, StoreError> {
        let operation = StoreOperation::FetchBinary;
        let resource = format!("assets/{}", asset_id);
        let state = self.begin(operation, resource.clone())?;

        state
            .files
            .get(asset_id.as_str())
            .map(|f| f.bytes.clone())
            .ok_or_else(|| not_found(operation, resource))
    }

    async fn fetch_record(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Map<String, Value>, StoreError> {
        let operation = StoreOperation::FetchRecord;
        let resource = format!("items/{}/{}", collection, key);
        let state = self.begin(operation, resource.clone())?;

        state
            .records
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| not_found(operation, resource))
    }

    async fn patch_markers(
        &self,
        asset_id: &AssetId,
        update: &MarkerUpdate,
    ) -> Result<(), StoreError> {
        let operation = StoreOperation::PatchMarkers;
        let resource = format!("files/{}", asset_id);
        let mut state = self.begin(operation, resource.clone())?;

        state.revision += 1;
        let revision = state.revision;
        let file = state
            .files
            .get_mut(asset_id.as_str())
            .ok_or_else(|| not_found(operation, resource))?;

        if let Value::Object(body) = update.to_patch_body() {
            file.record.extend(body);
        }
        file.record.insert(
            "modified_on".to_string(),
            Value::String(format!("rev-{}", revision)),
        );

        state.publish(asset_id);
        Ok(())
    }

    async fn patch_binary(
        &self,
        asset_id: &AssetId,
        upload: BinaryUpload,
    ) -> Result<(), StoreError> {
        let operation = StoreOperation::PatchBinary;
        let resource = format!("files/{}", asset_id);
        let mut state = self.begin(operation, resource.clone())?;

        state.revision += 1;
        let revision = state.revision;
        let file = state
            .files
            .get_mut(asset_id.as_str())
            .ok_or_else(|| not_found(operation, resource))?;

        file.bytes = upload.bytes;
        file.record
            .insert("type".to_string(), Value::String(upload.media_type));
        file.record.insert(
            "filename_download".to_string(),
            Value::String(upload.file_name),
        );
        file.record.insert(
            "modified_on".to_string(),
            Value::String(format!("rev-{}", revision)),
        );

        state.publish(asset_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
