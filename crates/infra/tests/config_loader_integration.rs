//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files and
//! building a client from it.

use std::io::Write;

use taskdesk_domain::{StorageBackend, TaskdeskError};
use taskdesk_infra::{config, TaskdeskClient};
use tempfile::Builder;

fn temp_config(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file
}

#[test]
fn test_load_config_from_toml_file() -> anyhow::Result<()> {
    let file = temp_config(
        r#"
        [api]
        base_url = "https://tasks.example.com/api"
        timeout_ms = 10000
        client_version = "2.4.0"

        [retry]
        max_retries = 5
        base_delay_ms = 500

        [throttle]
        max_concurrent = 4

        [dedup]
        enabled = false

        [storage]
        backend = "memory"
        "#,
        ".toml",
    );

    let config = config::load_from_file(Some(file.path().to_path_buf()))?;

    assert_eq!(config.api.base_url, "https://tasks.example.com/api");
    assert_eq!(config.api.timeout_ms, 10_000);
    assert_eq!(config.api.client_version, "2.4.0");
    assert_eq!(config.api.api_version, "1.0");
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.base_delay_ms, 500);
    assert_eq!(config.throttle.max_concurrent, 4);
    assert!(!config.dedup.enabled);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.session.refresh_threshold_secs, 300);
    Ok(())
}

#[test]
fn test_load_config_with_minimal_fields() {
    let file = temp_config(r#"{ "api": { "base_url": "http://127.0.0.1:5000/api" } }"#, ".json");

    let config = config::load_from_file(Some(file.path().to_path_buf()))
        .expect("Failed to load minimal JSON config");

    assert_eq!(config.api.base_url, "http://127.0.0.1:5000/api");
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.throttle.max_concurrent, 10);
    assert!(config.dedup.enabled);
    assert_eq!(config.dedup.window_ms, 5_000);
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result = config::load_from_file(Some("/definitely/not/here/taskdesk.toml".into()));

    assert!(matches!(result, Err(TaskdeskError::Config(msg)) if msg.contains("not found")));
}

#[test]
fn test_load_config_with_invalid_format() {
    let file = temp_config("{ this is not json", ".json");

    let result = config::load_from_file(Some(file.path().to_path_buf()));

    assert!(matches!(result, Err(TaskdeskError::Config(msg)) if msg.contains("Invalid JSON")));
}

#[tokio::test]
async fn test_client_from_loaded_config() -> anyhow::Result<()> {
    let file = temp_config(
        r#"
        [api]
        base_url = "http://127.0.0.1:9/api"

        [storage]
        backend = "memory"
        "#,
        ".toml",
    );
    let config = config::load_from_file(Some(file.path().to_path_buf()))?;

    let client = TaskdeskClient::from_config(config)?;

    assert!(!client.auth().is_authenticated());
    assert_eq!(client.api().stats().active_requests, 0);
    client.shutdown();
    Ok(())
}

#[test]
fn test_client_rejects_invalid_loaded_config() {
    let file = temp_config(r#"{ "api": { "base_url": "ftp://files.example.com" } }"#, ".json");
    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    let err = TaskdeskClient::from_config(config).unwrap_err();

    assert!(matches!(err, TaskdeskError::Config(msg) if msg.contains("scheme")));
}
