//! Layered configuration loading.
//!
//! Sources, later overriding earlier:
//!  1. `/etc/asset-watermark/service.yaml`
//!  2. `./config/service.yaml`
//!  3. the file named by `AW_CONFIG_FILE` (required when set)
//!  4. environment variables prefixed `AW__`, with `__` between sections,
//!     e.g. `AW__SERVER__PORT=9090` sets `server.port`

use std::collections::HashMap;
use tracing::info;
use watermark_api::{ConfigError, ServiceConfig};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/asset-watermark/service";
pub const LOCAL_CONFIG_PATH: &str = "config/service";
pub const CONFIG_FILE_VAR: &str = "AW_CONFIG_FILE";
pub const ENV_PREFIX: &str = "AW";

/// Where configuration is read from
#[derive(Debug, Clone)]
pub struct ConfigSources {
    /// Optional YAML files, lowest precedence first
    pub optional_files: Vec<String>,

    /// Operator-specified YAML file that must exist
    pub explicit_file: Option<String>,

    /// Environment override; `None` reads the process environment
    pub environment: Option<HashMap<String, String>>,
}

impl ConfigSources {
    /// Sources used by the service binary
    pub fn from_process_env() -> Self {
        let explicit_file = std::env::var(CONFIG_FILE_VAR)
            .ok()
            .filter(|path| !path.is_empty());

        Self {
            optional_files: vec![
                SYSTEM_CONFIG_PATH.to_string(),
                LOCAL_CONFIG_PATH.to_string(),
            ],
            explicit_file,
            environment: None,
        }
    }
}

/// Build and validate the service configuration
///
/// Absent optional files are fine: every field has a default. A malformed
/// file, or a variable that cannot be coerced to its field's type, is an
/// error.
pub fn load(sources: &ConfigSources) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for path in &sources.optional_files {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(false)
                .format(config::FileFormat::Yaml),
        );
    }

    if let Some(path) = &sources.explicit_file {
        info!(path = %path, "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let environment = config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .source(sources.environment.clone());

    let service_config: ServiceConfig = builder
        .add_source(environment)
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
