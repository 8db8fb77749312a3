//! etcd store backend
//!
//! Maps the [`Store`] capabilities onto etcd v3:
//!
//! - TTL writes attach the key to a freshly granted lease
//! - directory markers are keys with an empty value
//! - `mod_revision` is used as `last_index`
//! - watches deliver the current state first, then resume from the read
//!   revision so no change between read and subscription is lost

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, EventType, GetOptions, Identity, KeyValue, PutOptions,
    TlsOptions, WatchOptions, WatchStream,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::constants::DEFAULT_WATCHER_BUFFER_SIZE;
use crate::utils::join_path;
use crate::{
    KVPair, KvTreeWatchStream, KvWatchStream, Result, Store, StoreConfig, StoreError, WriteOptions,
};

/// [`Store`] backed by an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

/// Lease TTL in whole seconds, rounded up, at least one second.
pub(crate) fn lease_ttl_secs(ttl: Duration) -> i64 {
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs = secs.saturating_add(1);
    }
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

pub(crate) fn to_pair(kv: &KeyValue) -> KVPair {
    KVPair {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: kv.value().to_vec(),
        last_index: kv.mod_revision().max(0) as u64,
    }
}

/// Prefix matching every key strictly below `directory`.
pub(crate) fn tree_prefix(directory: &str) -> String {
    if directory.is_empty() {
        String::new()
    } else {
        format!("{directory}/")
    }
}

impl EtcdStore {
    /// Connects to the etcd cluster described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ConnectOptions::new();
        if !config.connection_timeout.is_zero() {
            options = options.with_connect_timeout(config.connection_timeout);
        }
        if let Some(tls) = &config.tls {
            info!("Initializing etcd client with TLS...");
            let tls_options = TlsOptions::new()
                .ca_certificate(Certificate::from_pem(&tls.ca_cert))
                .identity(Identity::from_pem(&tls.cert, &tls.key));
            options = options.with_tls(tls_options);
        }

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| StoreError::Connect {
                endpoints: config.endpoints.join(","),
                source: Box::new(e),
            })?;

        debug!(endpoints = ?config.endpoints, "Connected to etcd");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Current value of `key` plus the store revision of the read.
    async fn read(
        &self,
        key: &str,
    ) -> Result<(Option<KVPair>, i64)> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        let revision = resp.header().map(|h| h.revision()).unwrap_or(0);
        Ok((resp.kvs().first().map(to_pair), revision))
    }

    /// Non-marker keys below `directory` plus the store revision of the read.
    async fn children(
        &self,
        directory: &str,
    ) -> Result<(Vec<KVPair>, i64)> {
        let mut client = self.client.clone();
        let resp = client
            .get(tree_prefix(directory), Some(GetOptions::new().with_prefix()))
            .await?;
        let revision = resp.header().map(|h| h.revision()).unwrap_or(0);
        let pairs = resp
            .kvs()
            .iter()
            .filter(|kv| !kv.value().is_empty())
            .map(to_pair)
            .collect();
        Ok((pairs, revision))
    }
}

fn resume_from(
    options: WatchOptions,
    revision: i64,
) -> WatchOptions {
    if revision > 0 {
        options.with_start_revision(revision + 1)
    } else {
        options
    }
}

/// Forwards PUT events of a single-key watch until cancelled or lost.
async fn forward_key_events(
    stream: &mut WatchStream,
    tx: &mpsc::Sender<KVPair>,
    cancel: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = stream.message() => message,
        };

        match message {
            Ok(Some(resp)) => {
                if resp.canceled() {
                    warn!("etcd watch canceled by server");
                    return;
                }
                for event in resp.events() {
                    if let (EventType::Put, Some(kv)) = (event.event_type(), event.kv()) {
                        if tx.send(to_pair(kv)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(None) => {
                debug!("etcd watch stream ended");
                return;
            }
            Err(e) => {
                warn!(error = %e, "etcd watch stream failed");
                return;
            }
        }
    }
}

/// Re-lists `directory` after every change batch until cancelled or lost.
async fn forward_tree_events(
    store: &EtcdStore,
    directory: &str,
    stream: &mut WatchStream,
    tx: &mpsc::Sender<Vec<KVPair>>,
    cancel: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = stream.message() => message,
        };

        match message {
            Ok(Some(resp)) => {
                if resp.canceled() {
                    warn!(directory, "etcd tree watch canceled by server");
                    return;
                }
                if resp.events().is_empty() {
                    continue;
                }
                match store.children(directory).await {
                    Ok((pairs, _)) => {
                        trace!(directory, children = pairs.len(), "tree change");
                        if tx.send(pairs).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(directory, error = %e, "failed to list directory after change");
                        return;
                    }
                }
            }
            Ok(None) => {
                debug!(directory, "etcd tree watch stream ended");
                return;
            }
            Err(e) => {
                warn!(directory, error = %e, "etcd tree watch stream failed");
                return;
            }
        }
    }
}

#[async_trait]
impl Store for EtcdStore {
    async fn put(
        &self,
        key: &str,
        value: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        let key = join_path([key]);
        let mut client = self.client.clone();

        let put_options = if options.expires() {
            let lease = client.lease_grant(lease_ttl_secs(options.ttl), None).await?;
            Some(PutOptions::new().with_lease(lease.id()))
        } else {
            None
        };
        let value = if options.is_dir { Vec::new() } else { value.to_vec() };

        client.put(key, value, put_options).await?;
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<KVPair> {
        let key = join_path([key]);
        match self.read(&key).await? {
            (Some(pair), _) => Ok(pair),
            (None, _) => Err(StoreError::KeyNotFound(key).into()),
        }
    }

    async fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        let mut client = self.client.clone();
        let resp = client
            .get(join_path([key]), Some(GetOptions::new().with_count_only()))
            .await?;
        Ok(resp.count() > 0)
    }

    async fn watch(
        &self,
        key: &str,
        cancel: CancellationToken,
    ) -> Result<KvWatchStream> {
        let key = join_path([key]);
        let (current, revision) = self.read(&key).await?;
        let current = current.ok_or_else(|| StoreError::KeyNotFound(key.clone()))?;

        let mut client = self.client.clone();
        let (mut watcher, mut stream) = client
            .watch(key.clone(), Some(resume_from(WatchOptions::new(), revision)))
            .await?;

        let (tx, rx) = mpsc::channel(DEFAULT_WATCHER_BUFFER_SIZE);
        tokio::spawn(async move {
            if tx.send(current).await.is_ok() {
                forward_key_events(&mut stream, &tx, &cancel).await;
            }
            let _ = watcher.cancel().await;
            trace!(key = %key, "etcd key watch closed");
        });

        Ok(rx)
    }

    async fn watch_tree(
        &self,
        directory: &str,
        cancel: CancellationToken,
    ) -> Result<KvTreeWatchStream> {
        let directory = join_path([directory]);
        if !self.exists(&directory).await? {
            return Err(StoreError::KeyNotFound(directory).into());
        }
        let (children, revision) = self.children(&directory).await?;

        let mut client = self.client.clone();
        let (mut watcher, mut stream) = client
            .watch(
                tree_prefix(&directory),
                Some(resume_from(WatchOptions::new().with_prefix(), revision)),
            )
            .await?;

        let store = self.clone();
        let (tx, rx) = mpsc::channel(DEFAULT_WATCHER_BUFFER_SIZE);
        tokio::spawn(async move {
            if tx.send(children).await.is_ok() {
                forward_tree_events(&store, &directory, &mut stream, &tx, &cancel).await;
            }
            let _ = watcher.cancel().await;
            trace!(directory = %directory, "etcd tree watch closed");
        });

        Ok(rx)
    }
}
