//! Tests for loading configuration from disk and building components from it.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use munin::MuninError;
use munin::cache::WriteStrategy;
use munin::config::{BackendSpec, MuninConfig};

const FULL_CONFIG: &str = r#"
fallback = "memory://"

[[backends]]
name = "primary"
env_key = "MUNIN_TEST_PRIMARY_URL"

[[backends]]
name = "secondary"
env_key = "MUNIN_TEST_SECONDARY_URL"

[connection]
connect_timeout = 1000
response_timeout = 500

[health]
timeout = 1500
degraded_threshold = 200

[cache]
size_threshold = 1024
reference_ttl = 60000
write_strategy = "fan_out"

[policy]
cacheable = ["Read", "LSP"]
default_ttl_secs = 120

[policy.tool_ttls]
Read = 30
"#;

#[test]
fn load_full_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_CONFIG.as_bytes()).unwrap();

    let config = MuninConfig::load(file.path()).unwrap();

    assert_eq!(
        config.backends,
        [
            BackendSpec::new("primary", "MUNIN_TEST_PRIMARY_URL"),
            BackendSpec::new("secondary", "MUNIN_TEST_SECONDARY_URL"),
        ]
    );
    assert_eq!(config.fallback.as_deref(), Some("memory://"));
    assert_eq!(config.connection.connect_timeout, Duration::from_secs(1));
    assert_eq!(config.connection.response_timeout, Duration::from_millis(500));
    assert_eq!(config.health.timeout, Duration::from_millis(1500));
    assert_eq!(config.health.degraded_threshold, Duration::from_millis(200));
    assert_eq!(config.cache.size_threshold, 1024);
    assert_eq!(config.cache.reference_ttl, Duration::from_secs(60));
    assert_eq!(config.cache.write_strategy, WriteStrategy::FanOut);

    assert!(config.policy.is_cacheable("LSP"));
    assert!(!config.policy.is_cacheable("Grep"));
    assert!(!config.policy.is_cacheable("Bash"));
    assert_eq!(config.policy.ttl_for("Read"), Duration::from_secs(30));
    assert_eq!(config.policy.ttl_for("LSP"), Duration::from_secs(120));
}

#[test]
fn unreadable_toml_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[cache\nsize_threshold = ").unwrap();

    let err = MuninConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, MuninError::Toml(_)));
}

#[test]
fn missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MuninConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, MuninError::Configuration(_)));
}

#[tokio::test]
async fn configured_cache_uses_fallback_until_probed() {
    let config = MuninConfig::from_toml_str(FULL_CONFIG).unwrap();
    let registry = Arc::new(config.registry());
    registry.initialize_with(&config.backends, |_| None);

    let cache = config.tool_cache(Arc::clone(&registry)).unwrap();
    let input = json!({"symbol": "main"});

    assert_eq!(cache.store("LSP", &input, "fn main()".into()).await, "fn main()");
    assert_eq!(cache.lookup("LSP", &input).await.as_deref(), Some("fn main()"));
    assert_eq!(cache.config().size_threshold, 1024);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn monitor_uses_configured_timeouts() {
    let config = MuninConfig::from_toml_str(FULL_CONFIG).unwrap();
    let monitor = config.health_monitor();
    assert_eq!(monitor.config().timeout, Duration::from_millis(1500));

    let registry = config.registry();
    registry.initialize_with(&config.backends, |key| {
        (key == "MUNIN_TEST_PRIMARY_URL").then(|| "memory://".to_string())
    });
    let report = monitor.report(&registry, &config.backends).await;
    assert_eq!(report.len(), 2);
    assert!(report[0].is_up());
    assert!(!report[1].is_up());
}
