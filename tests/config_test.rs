//! Configuration loading tests
//!
//! Covers JSON files, environment variables and the layering between them.

use std::env;
use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use sni_override::config::{ConfigError, TlsVersion, TransportConfig};
use sni_override::InterceptingTransport;

const ENV_VARS: &[&str] = &[
    "SNI_OVERRIDE_CONNECT_TIMEOUT_MS",
    "SNI_OVERRIDE_MIN_TLS_VERSION",
    "SNI_OVERRIDE_ALPN",
    "SNI_OVERRIDE_TCP_NODELAY",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("sni-override.json");
    fs::write(&path, content).unwrap();
    path
}

const CONFIG_JSON: &str = r#"{
    "connect_timeout_ms": 3000,
    "handshake_timeout_ms": 4000,
    "min_tls_version": "1.3",
    "alpn": ["h2", "http/1.1"],
    "overrides": [
        { "host": "example.org", "address": "122.228.95.175" },
        { "host": "*.example.net", "address": "10.0.0.1", "port": 8443 }
    ]
}"#;

#[test]
fn test_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG_JSON);

    let config = TransportConfig::from_file(&path).unwrap();
    assert_eq!(config.connect_timeout(), Duration::from_millis(3000));
    assert_eq!(config.handshake_timeout(), Duration::from_millis(4000));
    assert_eq!(config.min_tls_version, TlsVersion::Tls13);
    assert_eq!(config.alpn, vec!["h2", "http/1.1"]);
    // Unset keys keep their defaults
    assert!(config.tcp_nodelay);
    assert!(config.use_system_roots);

    let rules = config.override_rules().unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].target_port(), Some(8443));
}

#[test]
fn test_from_file_errors() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        TransportConfig::from_file(dir.path().join("missing.json")),
        Err(ConfigError::FileNotFound(_))
    ));

    let path = write_config(&dir, "{ not json");
    assert!(matches!(TransportConfig::from_file(&path), Err(ConfigError::Load(_))));
}

#[test]
#[serial]
fn test_load_layers_environment_over_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG_JSON);

    env::set_var("SNI_OVERRIDE_CONNECT_TIMEOUT_MS", "2500");
    env::set_var("SNI_OVERRIDE_TCP_NODELAY", "false");
    let config = TransportConfig::load(Some(path.as_path()));
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.connect_timeout_ms, 2500);
    assert!(!config.tcp_nodelay);
    // From the file
    assert_eq!(config.handshake_timeout_ms, 4000);
    assert_eq!(config.overrides.len(), 2);
}

#[test]
#[serial]
fn test_load_environment_only() {
    clear_env();
    env::set_var("SNI_OVERRIDE_MIN_TLS_VERSION", "1.3");
    env::set_var("SNI_OVERRIDE_ALPN", "h2,http/1.1");
    let config = TransportConfig::load(None);
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.min_tls_version, TlsVersion::Tls13);
    assert_eq!(config.alpn, vec!["h2", "http/1.1"]);
    assert_eq!(config.connect_timeout_ms, 10_000);
}

#[test]
#[serial]
fn test_load_missing_explicit_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let result = TransportConfig::load(Some(dir.path().join("absent.json").as_path()));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn test_transport_from_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG_JSON);
    let config = TransportConfig::from_file(&path).unwrap();

    let transport = InterceptingTransport::from_config(&config).unwrap();
    let rule = transport.rules().resolve("api.example.net").unwrap();
    assert_eq!(rule.socket_addr(443).to_string(), "10.0.0.1:8443");
    assert!(transport.rules().resolve("example.net").is_none());
}

#[test]
fn test_transport_from_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{ "overrides": [ { "host": "example.org", "address": "example.net" } ] }"#,
    );
    let config = TransportConfig::from_file(&path).unwrap();

    assert!(InterceptingTransport::from_config(&config).is_err());
}
