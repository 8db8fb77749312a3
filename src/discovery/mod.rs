//! Discovery orchestrator
//!
//! Publishes nodes under a namespace of a distributed key-value store and
//! watches that namespace. Every long-running operation runs in its own task,
//! is stopped through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and reports through a channel:
//!
//! ```text
//! register(key)     ──► put <ns>/<key> every heartbeat ──► Receiver<Error>
//! watch_nodes()     ──► watch_tree <ns> ──► fetch ──► decode ──► Receiver<Result<Entries>>
//! watch_extend(key) ──► watch <key> ──► lastIndex filter ──► Receiver<Result<Vec<u8>>>
//! ```

mod fetch;
mod register;
mod watch_extend;
mod watch_nodes;

#[cfg(test)]
mod watch_extend_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::constants::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_WATCH_RETRY_MS, NODES_DIR};
use crate::utils::{join_path, parse_uris};
use crate::{
    BackendRegistry, DiscoveryConfig, DiscoveryError, KvOptions, Result, Store, StoreConfig,
};

/// Connection timeout used by [`Discovery::initialize`]
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to one discovery namespace. Cheap to clone; clones share the store
/// connection.
#[derive(Clone)]
pub struct Discovery {
    store: Arc<dyn Store>,
    heartbeat: Duration,
    ttl: Duration,
    /// Prefix taken from the uri list, may be empty
    prefix: String,
    /// `<prefix>/<kv.path>/nodes`
    nspath: String,
    watch_retry: Duration,
    channel_capacity: usize,
}

impl fmt::Debug for Discovery {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("heartbeat", &self.heartbeat)
            .field("ttl", &self.ttl)
            .field("prefix", &self.prefix)
            .field("nspath", &self.nspath)
            .field("watch_retry", &self.watch_retry)
            .finish_non_exhaustive()
    }
}

fn validate_timing(
    heartbeat: Duration,
    ttl: Duration,
) -> Result<()> {
    if heartbeat.is_zero() {
        return Err(DiscoveryError::InvalidHeartbeat(heartbeat).into());
    }
    if heartbeat >= ttl {
        warn!(
            ?heartbeat,
            ?ttl,
            "heartbeat is not shorter than ttl, registered entries may expire between writes"
        );
    }
    Ok(())
}

impl Discovery {
    /// Connects to the store and computes the namespace path.
    ///
    /// # Arguments
    /// * `registry` - Backend constructors to pick `backend` from
    /// * `uris` - `host:port[,host:port...][/prefix]`
    /// * `options` - `kv.path`, `kv.cacertfile`, `kv.certfile`, `kv.keyfile`
    ///
    /// # Errors
    /// Fails without retry when TLS material cannot be loaded, the backend is
    /// unknown or the store connection cannot be established.
    pub async fn initialize(
        registry: &BackendRegistry,
        backend: &str,
        uris: &str,
        heartbeat: Duration,
        ttl: Duration,
        options: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::connect(
            registry,
            backend,
            uris,
            heartbeat,
            ttl,
            options,
            DEFAULT_CONNECT_TIMEOUT,
        )
        .await
    }

    /// Same as [`Discovery::initialize`], driven by a loaded configuration.
    pub async fn from_config(
        registry: &BackendRegistry,
        config: &DiscoveryConfig,
    ) -> Result<Self> {
        config.validate()?;
        let discovery = Self::connect(
            registry,
            &config.backend,
            &config.uris,
            config.heartbeat(),
            config.ttl(),
            &config.to_options(),
            config.connect_timeout(),
        )
        .await?;

        Ok(discovery
            .with_watch_retry(config.watch_retry())
            .with_channel_capacity(config.channel_capacity))
    }

    async fn connect(
        registry: &BackendRegistry,
        backend: &str,
        uris: &str,
        heartbeat: Duration,
        ttl: Duration,
        options: &HashMap<String, String>,
        connection_timeout: Duration,
    ) -> Result<Self> {
        validate_timing(heartbeat, ttl)?;

        let (endpoints, prefix) = parse_uris(uris)?;
        let kv = KvOptions::from_map(options);

        let tls = match &kv.tls {
            Some(files) => {
                info!("Initializing discovery with TLS...");
                Some(files.load()?)
            }
            None => {
                info!("Initializing discovery without TLS...");
                None
            }
        };

        let nspath = join_path([prefix.as_str(), kv.base_path.as_str(), NODES_DIR]);
        let store = registry
            .open(
                backend,
                StoreConfig {
                    endpoints,
                    tls,
                    connection_timeout,
                },
            )
            .await?;

        info!(backend, namespace = %nspath, ?heartbeat, ?ttl, "discovery initialized");
        Ok(Self::build(store, heartbeat, ttl, prefix, nspath))
    }

    /// Wraps an already connected store. `namespace` is used as-is as the
    /// nodes directory.
    pub fn with_store(
        store: Arc<dyn Store>,
        heartbeat: Duration,
        ttl: Duration,
        namespace: &str,
    ) -> Result<Self> {
        validate_timing(heartbeat, ttl)?;
        Ok(Self::build(
            store,
            heartbeat,
            ttl,
            String::new(),
            join_path([namespace]),
        ))
    }

    fn build(
        store: Arc<dyn Store>,
        heartbeat: Duration,
        ttl: Duration,
        prefix: String,
        nspath: String,
    ) -> Self {
        Self {
            store,
            heartbeat,
            ttl,
            prefix,
            nspath,
            watch_retry: Duration::from_millis(DEFAULT_WATCH_RETRY_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Backoff between single-key watch resubscriptions.
    pub fn with_watch_retry(
        mut self,
        watch_retry: Duration,
    ) -> Self {
        self.watch_retry = watch_retry;
        self
    }

    pub fn with_channel_capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory holding one entry per registered node.
    pub fn namespace(&self) -> &str {
        &self.nspath
    }

    pub fn watch_retry(&self) -> Duration {
        self.watch_retry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Full store key of the node registered under `key`.
    pub fn node_path(
        &self,
        key: &str,
    ) -> String {
        join_path([self.nspath.as_str(), key])
    }
}
