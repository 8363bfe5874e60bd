//! Tests for [`ServiceConfig`] defaults and validation.

use super::*;

#[test]
fn test_defaults_are_valid() {
    let config = ServiceConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.server.endpoint_path, "/webhook/watermark");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.markers, MarkerStrategy::Tags);
    assert!(!config.logging.json_format);
}

#[test]
fn test_empty_document_deserializes_to_defaults() {
    let config: ServiceConfig = serde_json::from_str("{}").unwrap();

    assert_eq!(config.server.endpoint_path, "/webhook/watermark");
    assert_eq!(config.lock.ttl_seconds, 60);
    assert_eq!(config.consistency.delay_ms, 5_000);
    assert_eq!(config.watermark.jpeg_quality, 90);
}

#[test]
fn test_partial_sections_keep_remaining_defaults() {
    let config: ServiceConfig = serde_json::from_value(serde_json::json!({
        "server": { "port": 9090 },
        "lock": { "heartbeat": true },
        "markers": { "strategy": "field", "name": "watermark_digest" },
        "consistency": { "strategy": "poll" }
    }))
    .unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.lock.heartbeat);
    assert_eq!(config.lock.key_prefix, "processing:");
    assert_eq!(
        config.markers,
        MarkerStrategy::Field {
            name: "watermark_digest".to_string()
        }
    );
    assert_eq!(config.consistency.strategy, ConsistencyStrategy::Poll);
    assert_eq!(config.consistency.max_polls, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_store_url_is_missing() {
    let mut config = ServiceConfig::default();
    config.store.base_url = "  ".to_string();

    let err = config.validate().unwrap_err();
    assert!(
        matches!(err, ConfigError::Missing { ref key } if key == "store.base_url"),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn test_zero_ttl_is_rejected() {
    let mut config = ServiceConfig::default();
    config.lock.ttl_seconds = 0;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_jpeg_quality_bounds() {
    let mut config = ServiceConfig::default();

    config.watermark.jpeg_quality = 0;
    assert!(config.validate().is_err());

    config.watermark.jpeg_quality = 101;
    assert!(config.validate().is_err());

    config.watermark.jpeg_quality = 100;
    assert!(config.validate().is_ok());

    config.watermark.jpeg_quality = 1;
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_poll_bounds_rejected_only_when_polling() {
    let mut config = ServiceConfig::default();
    config.consistency.max_polls = 0;

    // The fixed strategy never reads the poll bounds.
    assert!(config.validate().is_ok());

    config.consistency.strategy = ConsistencyStrategy::Poll;
    assert!(config.validate().is_err());

    config.consistency.max_polls = 3;
    config.consistency.poll_interval_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_endpoint_path_rules() {
    let mut config = ServiceConfig::default();

    config.server.endpoint_path = String::new();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Missing { .. })
    ));

    config.server.endpoint_path = "webhook".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { .. })
    ));

    config.server.endpoint_path = "/health".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { .. })
    ));

    config.server.endpoint_path = "/hooks/directus".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_field_marker_requires_name() {
    let mut config = ServiceConfig::default();
    config.markers = MarkerStrategy::Field {
        name: String::new(),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::Missing { ref key }) if key == "markers.name"
    ));
}

#[test]
fn test_debug_output_redacts_store_token() {
    let mut config = ServiceConfig::default();
    config.store.token = Some("super-secret-token".to_string());

    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("<REDACTED>"));
}
