//! # Asset Watermark Service
//!
//! Binary entry point for the watermark pipeline.
//!
//! This executable:
//! - Loads layered configuration from files and the environment
//! - Initializes structured logging
//! - Builds the asset store connector, the Redis lock, the renderer and the
//!   dispatcher once, and shares them across requests
//! - Starts the HTTP server from watermark-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error,
//! 4 startup dependency failure.

mod settings;

use prometheus::Registry;
use settings::ConfigSources;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watermark_api::{start_server, LoggingConfig, ServiceConfig, ServiceError};
use watermark_core::{
    DirectusAssetStore, Dispatcher, DistributedLock, Pipeline, PipelineMetrics, RedisLockStore,
    Watermarker,
};

#[tokio::main]
async fn main() {
    let loaded = settings::load(&ConfigSources::from_process_env());

    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    init_tracing(&logging);

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting asset watermark service");

    if let Err(e) = run(service_config).await {
        error!(error = %e, "Service stopped with an error");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let default_filter = format!(
        "watermark_service={level},watermark_api={level},watermark_core={level},tower_http={level}",
        level = logging.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(service_config: ServiceConfig) -> Result<(), ServiceError> {
    let registry = Registry::new();
    let dispatcher = build_dispatcher(&service_config, &registry).await?;

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.server.endpoint_path,
        "Starting HTTP server"
    );

    start_server(service_config, dispatcher, registry).await
}

/// Build the long-lived clients and wire them into a dispatcher
async fn build_dispatcher(
    config: &ServiceConfig,
    registry: &Registry,
) -> Result<Dispatcher, ServiceError> {
    let store = DirectusAssetStore::new(&config.store).map_err(|e| ServiceError::Startup {
        component: "asset store".to_string(),
        message: e.to_string(),
    })?;
    info!(base_url = %store.base_url(), "Asset store connector ready");

    let lock_store = RedisLockStore::connect(&config.lock.redis_url)
        .await
        .map_err(|e| ServiceError::Startup {
            component: "lock store".to_string(),
            message: e.to_string(),
        })?;
    info!(
        ttl_seconds = config.lock.ttl_seconds,
        heartbeat = config.lock.heartbeat,
        "Lock store connected"
    );
    if config.lock.heartbeat {
        warn!("Lock heartbeat enabled; held locks are re-armed until released");
    }

    let watermarker = Watermarker::new(config.watermark.clone());
    info!(logo = watermarker.has_logo(), "Watermark renderer ready");

    let metrics = PipelineMetrics::new(registry).map_err(|e| ServiceError::Startup {
        component: "metrics".to_string(),
        message: e.to_string(),
    })?;

    let pipeline = Pipeline::new(
        Arc::new(store),
        DistributedLock::new(Arc::new(lock_store), config.lock.clone()),
        Arc::new(watermarker),
        config.markers.clone(),
        config.consistency.clone(),
        metrics,
    );

    Ok(Dispatcher::new(Arc::new(pipeline), config.triggers.clone()))
}
