//! Configuration management for the discovery service.
//!
//! Settings are merged from several sources, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. Config file passed by the caller
//! 3. Config file named by `DISCOVERY_CONFIG_PATH`
//! 4. Environment variables (`DISCOVERY__HEARTBEAT_MS`, `DISCOVERY__KV__PATH`, ...)

mod options;
mod tls;
pub use options::*;
pub use tls::*;

#[cfg(test)]
mod config_test;

//---
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::{
    BACKEND_ETCD, DEFAULT_CHANNEL_CAPACITY, DEFAULT_WATCH_RETRY_MS, OPTION_KV_CACERTFILE,
    OPTION_KV_CERTFILE, OPTION_KV_KEYFILE, OPTION_KV_PATH,
};
use crate::{DiscoveryError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Registered backend name
    /// Default: "etcd"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Endpoint list: `host:port[,host:port...][/prefix]`
    /// Default: "127.0.0.1:2379"
    #[serde(default = "default_uris")]
    pub uris: String,

    /// Interval between registration rewrites (milliseconds)
    /// Default: 5000
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Expiry window of a registered entry (milliseconds)
    /// Default: 15000
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Backoff between single-key watch resubscriptions (milliseconds)
    /// Default: 5000
    #[serde(default = "default_watch_retry_ms")]
    pub watch_retry_ms: u64,

    /// Store connection timeout (milliseconds)
    /// Default: 5000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of each loop output channel
    /// Default: 16
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Namespace and TLS options
    #[serde(default)]
    pub kv: KvConfig,

    /// Node registered by the service binary
    #[serde(default)]
    pub node: Option<NodeConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KvConfig {
    pub path: Option<String>,
    pub cacertfile: Option<String>,
    pub certfile: Option<String>,
    pub keyfile: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub key: String,
    #[serde(default)]
    pub data: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            uris: default_uris(),
            heartbeat_ms: default_heartbeat_ms(),
            ttl_ms: default_ttl_ms(),
            watch_retry_ms: default_watch_retry_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            kv: KvConfig::default(),
            node: None,
        }
    }
}

impl DiscoveryConfig {
    /// Loads the merged configuration.
    ///
    /// # Arguments
    /// * `path` - Optional config file, required to exist when given
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = path {
            config = config.add_source(File::with_name(path).required(true));
        }
        if let Ok(path) = env::var("DISCOVERY_CONFIG_PATH") {
            config = config.add_source(File::with_name(&path));
        }

        // Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("DISCOVERY")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Self = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_ms == 0 {
            return Err(DiscoveryError::InvalidHeartbeat(self.heartbeat()).into());
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn watch_retry(&self) -> Duration {
        Duration::from_millis(self.watch_retry_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Flattens the `kv` table into the `kv.*` option map.
    pub fn to_options(&self) -> HashMap<String, String> {
        [
            (OPTION_KV_PATH, &self.kv.path),
            (OPTION_KV_CACERTFILE, &self.kv.cacertfile),
            (OPTION_KV_CERTFILE, &self.kv.certfile),
            (OPTION_KV_KEYFILE, &self.kv.keyfile),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }
}

// Default implementations
fn default_backend() -> String {
    BACKEND_ETCD.into()
}
fn default_uris() -> String {
    "127.0.0.1:2379".into()
}
fn default_heartbeat_ms() -> u64 {
    5000
}
fn default_ttl_ms() -> u64 {
    15000
}
fn default_watch_retry_ms() -> u64 {
    DEFAULT_WATCH_RETRY_MS
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
