//! In-memory store backend
//!
//! A single-process [`Store`] with the semantics the orchestrator expects
//! from a distributed backend:
//!
//! - every write bumps a store-wide monotonic index used as `last_index`
//! - TTL keys expire lazily on access and through an optional sweeper task
//! - directory markers are explicit nodes without payload
//! - key and tree watchers are kept in lock-free registries; each holds a
//!   latest-value slot drained by its own forwarding task, so a slow
//!   subscriber skips intermediate states but always receives the newest one
//!
//! ```text
//! put()/expiry ──► nodes (RwLock<BTreeMap>) ──► notify_key()  ──► slot ──► forwarder ──► stream
//!                                          └──► notify_tree() ──► slot ──► forwarder ──► stream
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::ttl_index::TtlIndex;
use crate::constants::DEFAULT_WATCHER_BUFFER_SIZE;
use crate::utils::{is_descendant, join_path};
use crate::{KVPair, KvTreeWatchStream, KvWatchStream, Result, Store, StoreError, WriteOptions};

#[derive(Debug, Clone)]
struct MemNode {
    value: Vec<u8>,
    last_index: u64,
    is_dir: bool,
}

/// Registered subscriber: the watched key or directory and its latest-value
/// slot. Dropping the watcher closes the slot, which ends its forwarder.
#[derive(Debug)]
struct Watcher<T> {
    target: String,
    latest: watch::Sender<T>,
}

#[derive(Debug)]
struct MemoryStoreInner {
    nodes: RwLock<BTreeMap<String, MemNode>>,
    ttl: Mutex<TtlIndex>,
    /// Last assigned version stamp
    index: AtomicU64,
    key_watchers: DashMap<u64, Watcher<KVPair>>,
    tree_watchers: DashMap<u64, Watcher<Vec<KVPair>>>,
    next_watcher_id: AtomicU64,
    watcher_buffer_size: usize,
}

/// In-process [`Store`] backend. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_watcher_buffer(DEFAULT_WATCHER_BUFFER_SIZE)
    }

    /// Creates a store whose watcher channels hold `buffer_size` pending
    /// notifications. A subscriber lagging further behind only sees the
    /// newest state once it catches up.
    pub fn with_watcher_buffer(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                nodes: RwLock::new(BTreeMap::new()),
                ttl: Mutex::new(TtlIndex::new()),
                index: AtomicU64::new(0),
                key_watchers: DashMap::new(),
                tree_watchers: DashMap::new(),
                next_watcher_id: AtomicU64::new(1),
                watcher_buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Spawns a task expiring TTL keys every `interval`.
    ///
    /// The task holds only a weak reference and exits once every clone of the
    /// store has been dropped.
    pub fn spawn_expiry_sweeper(
        &self,
        interval: Duration,
    ) -> JoinHandle<()> {
        let weak: Weak<MemoryStoreInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => inner.purge_expired(),
                    None => {
                        debug!("memory store dropped, expiry sweeper exits");
                        break;
                    }
                }
            }
        })
    }

    /// Removes `key` and notifies tree watchers. Returns whether it existed.
    pub fn delete(
        &self,
        key: &str,
    ) -> bool {
        let key = join_path([key]);
        let removed = {
            let mut nodes = self.inner.nodes.write();
            let removed = nodes.remove(&key).is_some();
            self.inner.ttl.lock().unregister(&key);
            removed
        };
        if removed {
            self.inner.notify_tree(&key);
        }
        removed
    }

    /// Closes every active subscription, as a backend does when its session
    /// is lost. Returns the number of closed subscriptions.
    pub fn disconnect_watchers(&self) -> usize {
        let closed = self.inner.key_watchers.len() + self.inner.tree_watchers.len();
        self.inner.key_watchers.clear();
        self.inner.tree_watchers.clear();
        debug!(closed, "memory store watchers disconnected");
        closed
    }

    /// Whether `key` is a directory marker.
    pub fn is_dir(
        &self,
        key: &str,
    ) -> bool {
        self.inner.purge_expired();
        let key = join_path([key]);
        self.inner.nodes.read().get(&key).map(|n| n.is_dir).unwrap_or(false)
    }

    /// Expiry deadline of `key`, if it was written with a TTL.
    pub fn expires_at(
        &self,
        key: &str,
    ) -> Option<Instant> {
        self.inner.ttl.lock().expiration(&join_path([key]))
    }

    /// Number of keys currently carrying a TTL.
    pub fn ttl_key_count(&self) -> usize {
        self.inner.ttl.lock().len()
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.key_watchers.len() + self.inner.tree_watchers.len()
    }

    /// Number of non-directory keys.
    pub fn len(&self) -> usize {
        self.inner.purge_expired();
        self.inner.nodes.read().values().filter(|n| !n.is_dir).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_watcher_id(&self) -> u64 {
        self.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns the task moving the newest slot value into `out`.
    ///
    /// The task ends when `cancel` fires, the subscriber drops its stream or
    /// the watcher is removed from the registry, and unregisters `id` on exit.
    fn spawn_forwarder<T>(
        &self,
        id: u64,
        mut latest: watch::Receiver<T>,
        out: mpsc::Sender<T>,
        cancel: CancellationToken,
    ) where
        T: Clone + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = out.closed() => break,
                    changed = latest.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                // Wait for room first so the newest value is the one sent
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    permit = out.reserve() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let value = latest.borrow_and_update().clone();
                permit.send(value);
            }

            if let Some(inner) = weak.upgrade() {
                inner.key_watchers.remove(&id);
                inner.tree_watchers.remove(&id);
            }
            trace!(watcher_id = id, "watcher forwarder exits");
        });
    }
}

impl MemoryStoreInner {
    /// Drops expired keys and notifies tree watchers of the removals.
    fn purge_expired(&self) {
        let now = Instant::now();
        if !self.ttl.lock().may_have_expired(now) {
            return;
        }

        let expired: Vec<String> = {
            let mut nodes = self.nodes.write();
            let keys = self.ttl.lock().take_expired(now);
            keys.into_iter().filter(|k| nodes.remove(k).is_some()).collect()
        };

        for key in &expired {
            debug!(key = %key, "key expired");
            self.notify_tree(key);
        }
    }

    fn children(
        &self,
        directory: &str,
    ) -> Vec<KVPair> {
        children_of(&self.nodes.read(), directory)
    }

    fn notify_key(
        &self,
        pair: &KVPair,
    ) {
        let targets: Vec<u64> = self
            .key_watchers
            .iter()
            .filter(|w| w.target == pair.key)
            .map(|w| *w.key())
            .collect();

        for id in targets {
            publish(&self.key_watchers, id, pair.clone());
        }
    }

    fn notify_tree(
        &self,
        changed_key: &str,
    ) {
        let targets: Vec<(u64, String)> = self
            .tree_watchers
            .iter()
            .filter(|w| is_descendant(&w.target, changed_key))
            .map(|w| (*w.key(), w.target.clone()))
            .collect();

        // Listings are computed without holding a registry guard: the
        // subscribe path takes `nodes` before the registry.
        for (id, directory) in targets {
            let listing = self.children(&directory);
            publish(&self.tree_watchers, id, listing);
        }
    }
}

/// Non-directory nodes below `directory`.
fn children_of(
    nodes: &BTreeMap<String, MemNode>,
    directory: &str,
) -> Vec<KVPair> {
    nodes
        .iter()
        .filter(|(k, n)| !n.is_dir && is_descendant(directory, k))
        .map(|(k, n)| KVPair::new(k.clone(), n.value.clone(), n.last_index))
        .collect()
}

/// Replaces the slot value of watcher `id`; a watcher without forwarder is
/// unregistered.
fn publish<T>(
    registry: &DashMap<u64, Watcher<T>>,
    id: u64,
    value: T,
) {
    let closed = match registry.get(&id) {
        Some(watcher) => watcher.latest.send(value).is_err(),
        None => false,
    };
    if closed {
        registry.remove(&id);
        trace!(watcher_id = id, "watcher forwarder gone, unregistered");
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(
        &self,
        key: &str,
        value: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        self.inner.purge_expired();

        let key = join_path([key]);
        let last_index = self.inner.index.fetch_add(1, Ordering::SeqCst) + 1;
        let node = MemNode {
            value: if options.is_dir { Vec::new() } else { value.to_vec() },
            last_index,
            is_dir: options.is_dir,
        };

        {
            let mut nodes = self.inner.nodes.write();
            nodes.insert(key.clone(), node);
            let mut ttl = self.inner.ttl.lock();
            if options.expires() {
                ttl.register(key.clone(), Instant::now() + options.ttl);
            } else {
                ttl.unregister(&key);
            }
        }
        trace!(key = %key, last_index, ttl = ?options.ttl, is_dir = options.is_dir, "put");

        if !options.is_dir {
            self.inner.notify_key(&KVPair::new(key.clone(), value.to_vec(), last_index));
            self.inner.notify_tree(&key);
        }
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<KVPair> {
        self.inner.purge_expired();

        let key = join_path([key]);
        let nodes = self.inner.nodes.read();
        match nodes.get(&key) {
            Some(node) => Ok(KVPair::new(key.clone(), node.value.clone(), node.last_index)),
            None => Err(StoreError::KeyNotFound(key).into()),
        }
    }

    async fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        self.inner.purge_expired();
        Ok(self.inner.nodes.read().contains_key(&join_path([key])))
    }

    async fn watch(
        &self,
        key: &str,
        cancel: CancellationToken,
    ) -> Result<KvWatchStream> {
        self.inner.purge_expired();

        let key = join_path([key]);
        let id = self.next_watcher_id();
        let (out, receiver) = mpsc::channel(self.inner.watcher_buffer_size);

        // Snapshot and registration happen under one read guard, so a put
        // either lands in the snapshot or notifies the registered watcher.
        let slot = {
            let nodes = self.inner.nodes.read();
            let node = nodes.get(&key).ok_or_else(|| StoreError::KeyNotFound(key.clone()))?;
            let current = KVPair::new(key.clone(), node.value.clone(), node.last_index);

            let (latest, slot) = watch::channel(current.clone());
            self.inner.key_watchers.insert(
                id,
                Watcher {
                    target: key.clone(),
                    latest,
                },
            );
            // Fresh channel, capacity is at least one
            let _ = out.try_send(current);
            slot
        };

        self.spawn_forwarder(id, slot, out, cancel);
        trace!(watcher_id = id, key = %key, "key watcher registered");

        Ok(receiver)
    }

    async fn watch_tree(
        &self,
        directory: &str,
        cancel: CancellationToken,
    ) -> Result<KvTreeWatchStream> {
        self.inner.purge_expired();

        let directory = join_path([directory]);
        let id = self.next_watcher_id();
        let (out, receiver) = mpsc::channel(self.inner.watcher_buffer_size);

        let slot = {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&directory) {
                return Err(StoreError::KeyNotFound(directory).into());
            }
            let listing = children_of(&nodes, &directory);

            let (latest, slot) = watch::channel(listing.clone());
            self.inner.tree_watchers.insert(
                id,
                Watcher {
                    target: directory.clone(),
                    latest,
                },
            );
            let _ = out.try_send(listing);
            slot
        };

        self.spawn_forwarder(id, slot, out, cancel);
        trace!(watcher_id = id, directory = %directory, "tree watcher registered");

        Ok(receiver)
    }
}
