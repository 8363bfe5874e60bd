//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};
use watermark_core::{Acknowledgement, TriggerError};

/// Trigger handler errors with HTTP status code mapping
///
/// Only normalization can fail a trigger request; everything after it runs
/// detached and is reported through logs and metrics instead.
///
/// - `400 Bad Request`: the body is not JSON, not an object, or carries an
///   unusable identifier
/// - `502 Bad Gateway`: the referencing record could not be read from the
///   asset store
///
/// The response body is an [`Acknowledgement`] with `status: "error"`.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Body could not be parsed as JSON
    #[error("Malformed trigger body: {message}")]
    MalformedBody { message: String },

    /// Trigger normalization failure
    #[error("{0}")]
    Trigger(#[from] TriggerError),
}

impl WebhookHandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedBody { .. } => StatusCode::BAD_REQUEST,
            Self::Trigger(TriggerError::RecordLookup { .. }) => StatusCode::BAD_GATEWAY,
            Self::Trigger(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let reason = self.to_string();

        if status.is_server_error() {
            error!(status = %status, error = %reason, "Trigger could not be normalized");
        } else {
            warn!(status = %status, error = %reason, "Rejected trigger");
        }

        (status, Json(Acknowledgement::error(reason))).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Startup failed: {component}: {message}")]
    Startup { component: String, message: String },
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::Startup { .. } => 4,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}
