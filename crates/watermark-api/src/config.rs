//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use watermark_core::{
    ConsistencyConfig, ConsistencyStrategy, LockConfig, MarkerStrategy, StoreConfig,
    TriggerConfig, WatermarkConfig,
};

/// Service configuration
///
/// Every section carries serde defaults, so an empty source produces a
/// usable configuration pointing at local store and lock instances.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Asset store connection
    pub store: StoreConfig,

    /// Distributed lock
    pub lock: LockConfig,

    /// Eventual-consistency buffer before the metadata read
    pub consistency: ConsistencyConfig,

    /// Trigger resolution rules
    pub triggers: TriggerConfig,

    /// Processed-content marker placement
    pub markers: MarkerStrategy,

    /// Watermark appearance
    pub watermark: WatermarkConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;

        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "store.base_url".to_string(),
            });
        }

        if self.lock.redis_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "lock.redis_url".to_string(),
            });
        }

        if self.lock.ttl_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "lock.ttl_seconds must be greater than zero".to_string(),
            });
        }

        if !(1..=100).contains(&self.watermark.jpeg_quality) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "watermark.jpeg_quality must be between 1 and 100, got {}",
                    self.watermark.jpeg_quality
                ),
            });
        }

        if !(self.watermark.logo_width_ratio > 0.0 && self.watermark.logo_width_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "watermark.logo_width_ratio must be in (0, 1], got {}",
                    self.watermark.logo_width_ratio
                ),
            });
        }

        if self.consistency.strategy == ConsistencyStrategy::Poll
            && (self.consistency.max_polls == 0 || self.consistency.poll_interval_ms == 0)
        {
            return Err(ConfigError::Invalid {
                message: "consistency.max_polls and consistency.poll_interval_ms must be \
                          greater than zero when polling"
                    .to_string(),
            });
        }

        if let MarkerStrategy::Field { name } = &self.markers {
            if name.trim().is_empty() {
                return Err(ConfigError::Missing {
                    key: "markers.name".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Trigger endpoint path
    pub endpoint_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            endpoint_path: "/webhook/watermark".to_string(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_path.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.endpoint_path".to_string(),
            });
        }

        if !self.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "server.endpoint_path must start with '/', got '{}'",
                    self.endpoint_path
                ),
            });
        }

        if matches!(
            self.endpoint_path.as_str(),
            "/health" | "/ready" | "/metrics"
        ) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "server.endpoint_path '{}' collides with a built-in route",
                    self.endpoint_path
                ),
            });
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
