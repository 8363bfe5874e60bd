//! # Directus Asset Store
//!
//! HTTP implementation of [`AssetStore`] against a Directus-style REST API.
//!
//! | Operation        | Request                                        |
//! |------------------|------------------------------------------------|
//! | fetch_metadata   | `GET /files/{id}`                              |
//! | fetch_binary     | `GET /assets/{id}?cacheBust={unix millis}`     |
//! | fetch_record     | `GET /items/{collection}/{key}`                |
//! | patch_markers    | `PATCH /files/{id}` with a JSON body           |
//! | patch_binary     | `PATCH /files/{id}` with a multipart `file`    |
//!
//! Every read carries `Cache-Control: no-cache` and `Pragma: no-cache`; the
//! binary read additionally carries a unique query parameter so no
//! intermediary can serve a cached copy.

use crate::markers::MarkerUpdate;
use crate::store::{
    AssetMetadata, AssetStore, BinaryUpload, StoreConfig, StoreError, StoreOperation,
};
use crate::trigger::json_kind;
use crate::AssetId;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, multipart, Method, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Longest error body carried into a [`StoreError`]
const MAX_ERROR_BODY: usize = 512;

/// Errors raised while building the client
#[derive(Debug, Error)]
pub enum StoreClientError {
    #[error("Invalid store base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Failed to create HTTP client: {message}")]
    HttpClient { message: String },
}

/// Asset store backed by a Directus-style REST API
#[derive(Debug, Clone)]
pub struct DirectusAssetStore {
    http_client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl DirectusAssetStore {
    /// Build the client once; it is shared by every request
    pub fn new(config: &StoreConfig) -> Result<Self, StoreClientError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| StoreClientError::InvalidBaseUrl {
                url: config.base_url.clone(),
                message: e.to_string(),
            })?;

        if base_url.cannot_be_a_base() {
            return Err(StoreClientError::InvalidBaseUrl {
                url: config.base_url.clone(),
                message: "URL cannot carry a path".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| StoreClientError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn uncached(&self, url: Url) -> RequestBuilder {
        self.request(Method::GET, url)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: StoreOperation,
        resource: &str,
    ) -> Result<Response, StoreError> {
        let response = builder.send().await.map_err(|e| StoreError::Transport {
            operation,
            resource: resource.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(operation = %operation, resource = %resource, status = status.as_u16(), "Store request succeeded");
            return Ok(response);
        }

        let mut message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }

        warn!(
            operation = %operation,
            resource = %resource,
            status = status.as_u16(),
            "Store request failed"
        );

        Err(StoreError::Status {
            operation,
            resource: resource.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    /// Unwrap the `data` object of a JSON response
    async fn read_data(
        response: Response,
        operation: StoreOperation,
        resource: &str,
    ) -> Result<Map<String, Value>, StoreError> {
        let decode_error = |message: String| StoreError::Decode {
            operation,
            resource: resource.to_string(),
            message,
        };

        let body: Value = response
            .json()
            .await
            .map_err(|e| decode_error(e.to_string()))?;

        match body {
            Value::Object(mut envelope) => match envelope.remove("data") {
                Some(Value::Object(data)) => Ok(data),
                Some(other) => Err(decode_error(format!(
                    "expected 'data' to be an object, got {}",
                    json_kind(&other)
                ))),
                None => Err(decode_error("response has no 'data' member".to_string())),
            },
            other => Err(decode_error(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl AssetStore for DirectusAssetStore {
    async fn fetch_metadata(&self, asset_id: &AssetId) -> Result<AssetMetadata, StoreError> {
        let operation = StoreOperation::FetchMetadata;
        let resource = format!("files/{}", asset_id);
        let url = self.endpoint(&["files", asset_id.as_str()]);

        let response = self.send(self.uncached(url), operation, &resource).await?;

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let record = Self::read_data(response, operation, &resource).await?;
        let mut metadata = AssetMetadata::from_record(record);
        if etag.is_some() {
            metadata.version = etag;
        }

        Ok(metadata)
    }

    async fn fetch_binary(&self, asset_id: &AssetId) -> Result<Bytes, StoreError> {
        let operation = StoreOperation::FetchBinary;
        let resource = format!("assets/{}", asset_id);
        let mut url = self.endpoint(&["assets", asset_id.as_str()]);
        url.query_pairs_mut().append_pair(
            "cacheBust",
            &chrono::Utc::now().timestamp_millis().to_string(),
        );

        let response = self.send(self.uncached(url), operation, &resource).await?;

        response.bytes().await.map_err(|e| StoreError::Transport {
            operation,
            resource,
            message: e.to_string(),
        })
    }

    async fn fetch_record(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Map<String, Value>, StoreError> {
        let operation = StoreOperation::FetchRecord;
        let resource = format!("items/{}/{}", collection, key);
        let url = self.endpoint(&["items", collection, key]);

        let response = self.send(self.uncached(url), operation, &resource).await?;
        Self::read_data(response, operation, &resource).await
    }

    async fn patch_markers(
        &self,
        asset_id: &AssetId,
        update: &MarkerUpdate,
    ) -> Result<(), StoreError> {
        let operation = StoreOperation::PatchMarkers;
        let resource = format!("files/{}", asset_id);
        let url = self.endpoint(&["files", asset_id.as_str()]);

        let builder = self
            .request(Method::PATCH, url)
            .json(&update.to_patch_body());

        self.send(builder, operation, &resource).await?;
        Ok(())
    }

    async fn patch_binary(
        &self,
        asset_id: &AssetId,
        upload: BinaryUpload,
    ) -> Result<(), StoreError> {
        let operation = StoreOperation::PatchBinary;
        let resource = format!("files/{}", asset_id);
        let url = self.endpoint(&["files", asset_id.as_str()]);

        let part = multipart::Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.media_type)
            .map_err(|e| StoreError::Decode {
                operation,
                resource: resource.clone(),
                message: format!("invalid media type '{}': {}", upload.media_type, e),
            })?;
        let form = multipart::Form::new().part("file", part);

        let builder = self.request(Method::PATCH, url).multipart(form);

        self.send(builder, operation, &resource).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "directus_store_tests.rs"]
mod tests;
