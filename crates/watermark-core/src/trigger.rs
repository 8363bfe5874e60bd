//! # Trigger Normalization
//!
//! Maps the event shapes the CMS emits onto a single [`AssetId`].
//!
//! Three shapes are recognised:
//!
//! - **Direct**: `{"key": ..}`, `{"id": ..}` or `{"keys": [..]}`. The first
//!   id wins. A `collection` naming the file collection itself is still
//!   direct.
//! - **Gallery reference**: `{"collection": "product_images", "key": ..}`.
//!   The record is fetched and the collection's configured reference field
//!   holds the asset id.
//! - **Generic reference**: same as gallery, using the default reference
//!   field name.
//!
//! Anything that does not lead to an id is a skip, not an error. Only a body
//! that is not a JSON object, an id the store could never accept, or a failed
//! record lookup are errors.

use crate::store::{AssetStore, StoreError};
use crate::{AssetId, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Trigger resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Collections whose records are files; their keys are asset ids
    pub file_collections: Vec<String>,

    /// Gallery collection name to the field holding the asset id
    pub gallery_fields: BTreeMap<String, String>,

    /// Field read from records of any other collection
    pub default_reference_field: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            file_collections: vec!["directus_files".to_string()],
            gallery_fields: BTreeMap::from([(
                "product_images".to_string(),
                "image_file".to_string(),
            )]),
            default_reference_field: "image_file".to_string(),
        }
    }
}

impl TriggerConfig {
    /// Field holding the asset id for records of `collection`
    pub fn reference_field(&self, collection: &str) -> &str {
        self.gallery_fields
            .get(collection)
            .map(String::as_str)
            .unwrap_or(&self.default_reference_field)
    }

    fn is_file_collection(&self, collection: &str) -> bool {
        self.file_collections.iter().any(|c| c == collection)
    }
}

/// Result of normalizing a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The event designates this asset
    Asset(AssetId),

    /// The event designates no asset
    Skip { detail: String },
}

impl Resolution {
    fn skip(detail: impl Into<String>) -> Self {
        Self::Skip {
            detail: detail.into(),
        }
    }
}

/// Errors that prevent normalization
#[derive(Debug, Clone, Error)]
pub enum TriggerError {
    #[error("Trigger payload must be a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },

    #[error("Invalid asset identifier '{value}': {source}")]
    InvalidIdentifier {
        value: String,
        #[source]
        source: ValidationError,
    },

    #[error("Failed to look up {collection}/{key}: {source}")]
    RecordLookup {
        collection: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Normalize a raw trigger payload to an asset id
///
/// Performs at most one store read, and only for reference triggers.
pub async fn resolve(
    payload: &Value,
    config: &TriggerConfig,
    store: &dyn AssetStore,
) -> Result<Resolution, TriggerError> {
    let event = payload.as_object().ok_or(TriggerError::NotAnObject {
        kind: json_kind(payload),
    })?;

    let collection = event
        .get("collection")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty());

    match collection {
        Some(collection) if !config.is_file_collection(collection) => {
            let Some(key) = first_identifier(event.get("key"))
                .or_else(|| first_in_list(event.get("keys")))
            else {
                return Ok(Resolution::skip(format!(
                    "reference trigger for '{}' carries no record key",
                    collection
                )));
            };

            resolve_reference(collection, &key, config, store).await
        }
        _ => {
            let id = first_identifier(event.get("key"))
                .or_else(|| first_identifier(event.get("id")))
                .or_else(|| first_in_list(event.get("keys")));

            match id {
                Some(id) => to_asset(id),
                None => Ok(Resolution::skip("payload carries no asset identifier")),
            }
        }
    }
}

async fn resolve_reference(
    collection: &str,
    key: &str,
    config: &TriggerConfig,
    store: &dyn AssetStore,
) -> Result<Resolution, TriggerError> {
    let field = config.reference_field(collection);

    let record = store
        .fetch_record(collection, key)
        .await
        .map_err(|source| TriggerError::RecordLookup {
            collection: collection.to_string(),
            key: key.to_string(),
            source,
        })?;

    let reference = record.get(field).and_then(|value| match value {
        Value::Object(relation) => first_identifier(relation.get("id")),
        other => first_identifier(Some(other)),
    });

    match reference {
        Some(id) => {
            debug!(collection = %collection, key = %key, field = %field, asset_id = %id, "Resolved reference trigger");
            to_asset(id)
        }
        None => Ok(Resolution::skip(format!(
            "{}/{} has no value in '{}'",
            collection, key, field
        ))),
    }
}

fn to_asset(id: String) -> Result<Resolution, TriggerError> {
    AssetId::new(id.clone())
        .map(Resolution::Asset)
        .map_err(|source| TriggerError::InvalidIdentifier { value: id, source })
}

/// Read a string or integer id; blanks count as absent
fn first_identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn first_in_list(value: Option<&Value>) -> Option<String> {
    value?
        .as_array()?
        .iter()
        .find_map(|item| first_identifier(Some(item)))
}

/// Article and name of a JSON value's type, for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
