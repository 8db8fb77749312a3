use std::collections::HashMap;
use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::{DiscoveryError, Error};

fn cleanup_all_discovery_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DISCOVERY__") || key == "DISCOVERY_CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = DiscoveryConfig::default();

    assert_eq!(config.backend, "etcd");
    assert_eq!(config.uris, "127.0.0.1:2379");
    assert_eq!(config.heartbeat(), Duration::from_secs(5));
    assert_eq!(config.ttl(), Duration::from_secs(15));
    assert_eq!(config.watch_retry(), Duration::from_secs(5));
    assert_eq!(config.channel_capacity, 16);
    assert!(config.node.is_none());
    assert!(config.to_options().is_empty());
}

#[test]
#[serial]
fn load_without_sources_uses_defaults() {
    cleanup_all_discovery_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = DiscoveryConfig::load(None).unwrap();
        assert_eq!(config.backend, "etcd");
        assert_eq!(config.heartbeat_ms, 5000);
    });
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_discovery_env_vars();
    with_vars(
        vec![
            ("DISCOVERY__HEARTBEAT_MS", Some("1000")),
            ("DISCOVERY__BACKEND", Some("memory")),
            ("DISCOVERY__KV__PATH", Some("cluster/a")),
        ],
        || {
            let config = DiscoveryConfig::load(None).unwrap();

            assert_eq!(config.heartbeat(), Duration::from_secs(1));
            assert_eq!(config.backend, "memory");
            assert_eq!(config.kv.path.as_deref(), Some("cluster/a"));
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_discovery_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("discovery.toml");

    std::fs::write(
        &config_path,
        r#"
        backend = "memory"
        uris = "10.0.0.1:2379,10.0.0.2:2379/dc1"
        ttl_ms = 3000

        [kv]
        path = " cluster/b "
        cacertfile = "/certs/ca.pem"

        [node]
        key = "node-1"
        data = "10.0.0.9:8080"
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = DiscoveryConfig::load(config_path.to_str()).unwrap();

        assert_eq!(config.backend, "memory");
        assert_eq!(config.uris, "10.0.0.1:2379,10.0.0.2:2379/dc1");
        assert_eq!(config.ttl(), Duration::from_secs(3));
        // Untouched fields keep their defaults
        assert_eq!(config.heartbeat_ms, 5000);

        let node = config.node.clone().unwrap();
        assert_eq!(node.key, "node-1");
        assert_eq!(node.data, "10.0.0.9:8080");

        let options = config.to_options();
        assert_eq!(options.len(), 2);
        assert_eq!(options["kv.path"], " cluster/b ");
        assert_eq!(options["kv.cacertfile"], "/certs/ca.pem");
    });
}

#[test]
#[serial]
fn environment_overrides_file() {
    cleanup_all_discovery_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("discovery.toml");
    std::fs::write(&config_path, "heartbeat_ms = 2000\n").unwrap();

    with_vars(
        vec![
            ("DISCOVERY_CONFIG_PATH", config_path.to_str()),
            ("DISCOVERY__HEARTBEAT_MS", Some("700")),
        ],
        || {
            let config = DiscoveryConfig::load(None).unwrap();
            assert_eq!(config.heartbeat_ms, 700);
        },
    );
}

#[test]
#[serial]
fn load_rejects_zero_heartbeat() {
    cleanup_all_discovery_env_vars();
    with_vars(vec![("DISCOVERY__HEARTBEAT_MS", Some("0"))], || {
        let err = DiscoveryConfig::load(None).unwrap_err();
        assert!(matches!(
            err,
            Error::Discovery(DiscoveryError::InvalidHeartbeat(d)) if d.is_zero()
        ));
    });
}

#[test]
#[serial]
fn load_fails_on_missing_required_file() {
    cleanup_all_discovery_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let err = DiscoveryConfig::load(Some("/nonexistent/discovery.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    });
}

#[test]
fn kv_options_default_base_path() {
    let options = KvOptions::from_map(&HashMap::new());
    assert_eq!(options.base_path, "discovery/service");
    assert!(options.tls.is_none());
}

#[test]
fn kv_options_trims_base_path() {
    let map = HashMap::from([("kv.path".to_string(), "  cluster/a ".to_string())]);
    assert_eq!(KvOptions::from_map(&map).base_path, "cluster/a");
}

#[test]
fn kv_options_enable_tls_only_with_all_three_files() {
    let mut map = HashMap::from([
        ("kv.cacertfile".to_string(), "/c/ca.pem".to_string()),
        ("kv.certfile".to_string(), "/c/cert.pem".to_string()),
    ]);
    assert!(KvOptions::from_map(&map).tls.is_none());

    map.insert("kv.keyfile".to_string(), String::new());
    assert!(KvOptions::from_map(&map).tls.is_none());

    map.insert("kv.keyfile".to_string(), "/c/key.pem".to_string());
    let tls = KvOptions::from_map(&map).tls.unwrap();
    assert_eq!(tls, TlsFiles::new("/c/ca.pem", "/c/cert.pem", "/c/key.pem"));
}
