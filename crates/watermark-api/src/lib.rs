//! # Asset Watermark HTTP Service
//!
//! HTTP front end of the watermark pipeline.
//!
//! This service provides:
//! - The trigger endpoint, which normalizes a CMS event and acknowledges it
//!   immediately while the pipeline run continues in the background
//! - Health and readiness endpoints
//! - A Prometheus metrics endpoint

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use config::{LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use metrics::ServiceMetrics;
pub use responses::{HealthCheckResult, HealthResponse, ReadinessResponse};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use prometheus::{Registry, TextEncoder};
use serde_json::Value;
use std::{
    collections::HashMap,
    future::{Future, IntoFuture},
    sync::Arc,
    time::{Duration, Instant},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};
use watermark_core::{AckStatus, Acknowledgement, Dispatcher};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<ServiceMetrics>,
    pub registry: Registry,
}

impl AppState {
    /// Build the state, registering the HTTP metrics into `registry`
    pub fn new(
        config: ServiceConfig,
        dispatcher: Dispatcher,
        registry: Registry,
    ) -> Result<Self, prometheus::Error> {
        let metrics = ServiceMetrics::new(&registry)?;

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            metrics,
            registry,
        })
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let trigger_routes = Router::new()
        .route(&state.config.server.endpoint_path, post(handle_webhook))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(trigger_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM, then gives in-flight requests
/// `shutdown_timeout_seconds` to finish. Detached pipeline runs still in
/// flight at shutdown are abandoned; their locks expire through the TTL.
pub async fn start_server(
    config: ServiceConfig,
    dispatcher: Dispatcher,
    registry: Registry,
) -> Result<(), ServiceError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state =
        AppState::new(config, dispatcher, registry).map_err(|e| ServiceError::Startup {
            component: "metrics".to_string(),
            message: e.to_string(),
        })?;
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!(address = %address, "Starting HTTP server");

    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C signal handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!(timeout_seconds = shutdown_timeout.as_secs(), "Received SIGINT, initiating graceful shutdown");
            },
            _ = terminate => {
                info!(timeout_seconds = shutdown_timeout.as_secs(), "Received SIGTERM, initiating graceful shutdown");
            },
        }
    };

    serve_until(listener, app, shutdown_signal, shutdown_timeout).await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Serve until `shutdown` resolves, then wait at most `timeout` for open
/// connections to drain before returning anyway
async fn serve_until<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: F,
    timeout: Duration,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let graceful = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();

    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(timeout).await,
            // The server stopped without a shutdown signal
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = deadline => {
            warn!(
                timeout_seconds = timeout.as_secs_f64(),
                "Shutdown timeout elapsed, dropping in-flight requests"
            );
            Ok(())
        }
    }
}

// ============================================================================
// Trigger Handler
// ============================================================================

/// Handle a CMS trigger
///
/// Normalization happens inline; the pipeline run is detached, so the
/// response never waits for the transform or the store writes:
/// - `202 Accepted` when an asset was resolved and a run started
/// - `200 OK` when the event designates no asset
/// - `400`/`502` when the event could not be normalized
#[instrument(skip(state, body), fields(body_size = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Acknowledgement>), WebhookHandlerError> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            state.metrics.record_request(AckStatus::Error);
            return Err(WebhookHandlerError::MalformedBody {
                message: e.to_string(),
            });
        }
    };

    let acceptance = match state.dispatcher.accept(&payload).await {
        Ok(acceptance) => acceptance,
        Err(e) => {
            state.metrics.record_request(AckStatus::Error);
            return Err(e.into());
        }
    };

    let acknowledgement = acceptance.acknowledgement;
    state.metrics.record_request(acknowledgement.status);

    let status = match acknowledgement.status {
        AckStatus::Accepted => StatusCode::ACCEPTED,
        AckStatus::Skipped | AckStatus::Error => StatusCode::OK,
    };

    Ok((status, Json(acknowledgement)))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness check
#[instrument(skip_all)]
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check: the lock store must answer
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let start = Instant::now();
    let lock_store_ready = state.dispatcher.is_ready().await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut checks = HashMap::new();
    checks.insert(
        "lock_store".to_string(),
        HealthCheckResult {
            healthy: lock_store_ready,
            message: if lock_store_ready {
                "reachable".to_string()
            } else {
                "unreachable".to_string()
            },
            duration_ms,
        },
    );

    let response = ReadinessResponse {
        ready: lock_store_ready,
        timestamp: chrono::Utc::now(),
        checks,
    };

    if lock_store_ready {
        (StatusCode::OK, Json(response))
    } else {
        warn!(duration_ms, "Lock store not reachable; reporting not ready");
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Middleware
// ============================================================================

/// Assign or propagate `x-correlation-id` and log each request
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(%method, %uri, %status, duration_ms, "Request completed with server error");
    } else if status.is_client_error() {
        warn!(%method, %uri, %status, duration_ms, "Request completed with client error");
    } else {
        info!(%method, %uri, %status, duration_ms, "Request completed");
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
