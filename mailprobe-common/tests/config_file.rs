//! Loading the harness configuration from disk.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use mailprobe_common::{
    Backoff, ConfigError, HarnessConfig,
    config::IngestionRoute,
};

const FULL_CONFIG: &str = r#"(
    ingestion: (
        capture: (host: "127.0.0.1", port: 1025),
        backend: (host: "127.0.0.1", port: 2525),
        route: Backend,
        helo_name: "ci.example.com",
        sender: "probe@example.com",
        timeouts: (connect_secs: 3),
        inter_message_delay_ms: 2000,
        candidate_domains: ["127.0.0.1", "nnu.edu.kg"],
    ),
    api: (base_url: "http://localhost:3001", request_timeout_secs: 4),
    push: (url: "ws://localhost:3001", event_timeout_secs: 20),
    verify: (
        interval_ms: 500,
        max_attempts: Some(30),
        deadline_secs: 15,
        backoff: Exponential(factor: 2.0, max_interval_ms: 4000),
    ),
    frontend_url: Some("http://localhost:3000"),
)"#;

#[test]
fn test_load_full_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mailprobe.config.ron");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let (config, origin) = HarnessConfig::load(Some(&path)).unwrap();

    assert_eq!(origin.as_deref(), Some(path.as_path()));
    assert_eq!(config.ingestion.route, IngestionRoute::Backend);
    assert_eq!(config.ingestion.endpoint().addr(), "127.0.0.1:2525");
    assert_eq!(config.ingestion.helo_name, "ci.example.com");
    assert_eq!(config.ingestion.timeouts.connect_secs, 3);
    assert_eq!(config.ingestion.timeouts.data_secs, 30);
    assert_eq!(
        config.ingestion.inter_message_delay(),
        Duration::from_secs(2)
    );
    assert_eq!(config.ingestion.candidate_domains.len(), 2);
    assert_eq!(config.api.request_timeout(), Duration::from_secs(4));
    assert_eq!(config.push.event_timeout(), Duration::from_secs(20));
    assert_eq!(config.push.confirm_timeout(), Duration::from_secs(5));
    assert_eq!(config.verify.max_attempts, Some(30));
    assert!(matches!(
        config.verify.backoff,
        Backoff::Exponential { max_interval_ms: 4000, .. }
    ));
    assert_eq!(config.frontend_url.as_deref(), Some("http://localhost:3000"));
}

#[test]
fn test_load_rejects_invalid_push_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ron");
    std::fs::write(&path, r#"(push: (url: "localhost:3001"))"#).unwrap();

    let err = HarnessConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "push.url", .. }));
}

#[test]
fn test_load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.ron");

    let err = HarnessConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(p) if p == path));
}
