//! Tests for layered configuration loading.

use super::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use watermark_core::{ConsistencyStrategy, MarkerStrategy};

fn write_yaml(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(format!("{}.yaml", name));
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn sources(optional_files: Vec<String>, explicit_file: Option<String>) -> ConfigSources {
    ConfigSources {
        optional_files,
        explicit_file,
        environment: Some(HashMap::new()),
    }
}

#[test]
fn test_no_sources_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent").to_string_lossy().into_owned();

    let config = load(&sources(vec![missing], None)).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.endpoint_path, "/webhook/watermark");
    assert_eq!(config.lock.key_prefix, "processing:");
}

#[test]
fn test_later_file_overrides_earlier() {
    let dir = TempDir::new().unwrap();
    let system = write_yaml(
        dir.path(),
        "system",
        "server:\n  port: 7000\n  host: 127.0.0.1\nlock:\n  ttl_seconds: 120\n",
    );
    let local = write_yaml(dir.path(), "local", "server:\n  port: 7100\n");

    let config = load(&sources(vec![system, local], None)).unwrap();

    assert_eq!(config.server.port, 7100);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.lock.ttl_seconds, 120);
}

#[test]
fn test_explicit_file_overrides_optional_files() {
    let dir = TempDir::new().unwrap();
    let local = write_yaml(
        dir.path(),
        "local",
        "markers:\n  strategy: tags\nconsistency:\n  strategy: fixed\n",
    );
    let explicit = write_yaml(
        dir.path(),
        "explicit",
        "markers:\n  strategy: field\n  name: watermark_digest\nconsistency:\n  strategy: poll\n  max_polls: 4\n",
    );

    let config = load(&sources(vec![local], Some(explicit))).unwrap();

    assert_eq!(
        config.markers,
        MarkerStrategy::Field {
            name: "watermark_digest".to_string()
        }
    );
    assert_eq!(config.consistency.strategy, ConsistencyStrategy::Poll);
    assert_eq!(config.consistency.max_polls, 4);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let explicit = dir.path().join("nope.yaml").to_string_lossy().into_owned();

    let result = load(&sources(vec![], Some(explicit)));

    assert!(matches!(result, Err(ConfigError::Parsing { .. })));
}

#[test]
fn test_environment_overrides_files() {
    let dir = TempDir::new().unwrap();
    let local = write_yaml(dir.path(), "local", "server:\n  port: 7100\n");

    let environment = HashMap::from([
        ("AW__SERVER__PORT".to_string(), "9090".to_string()),
        (
            "AW__STORE__BASE_URL".to_string(),
            "https://cms.example.com".to_string(),
        ),
        ("AW__LOCK__HEARTBEAT".to_string(), "true".to_string()),
        ("UNRELATED__SERVER__PORT".to_string(), "1".to_string()),
    ]);
    let config = load(&ConfigSources {
        optional_files: vec![local],
        explicit_file: None,
        environment: Some(environment),
    })
    .unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.store.base_url, "https://cms.example.com");
    assert!(config.lock.heartbeat);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let broken = write_yaml(dir.path(), "broken", "server: [unterminated\n");

    let result = load(&sources(vec![broken], None));

    assert!(matches!(result, Err(ConfigError::Parsing { .. })));
}

#[test]
fn test_uncoercible_value_is_an_error() {
    let dir = TempDir::new().unwrap();
    let local = write_yaml(dir.path(), "local", "server:\n  port: not-a-port\n");

    let result = load(&sources(vec![local], None));

    assert!(matches!(result, Err(ConfigError::Parsing { .. })));
}

#[test]
fn test_loaded_configuration_is_validated() {
    let dir = TempDir::new().unwrap();
    let local = write_yaml(dir.path(), "local", "watermark:\n  jpeg_quality: 0\n");

    let result = load(&sources(vec![local], None));

    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}
