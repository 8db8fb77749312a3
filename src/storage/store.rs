//! Core model in discovery: Store Definition
//!
//! The capability interface the orchestrator consumes from a distributed
//! key-value backend. Keys are hierarchical `/`-separated paths.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::Result;
use crate::TlsMaterial;

/// Stream of value changes for one key. A closed channel means the
/// subscription was lost, not that the key reached a final state.
pub type KvWatchStream = mpsc::Receiver<KVPair>;

/// Stream of child listings for one directory. Each batch carries the
/// current children of the directory.
pub type KvTreeWatchStream = mpsc::Receiver<Vec<KVPair>>;

/// A key, its value and the backend-assigned version stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KVPair {
    /// Full hierarchical key
    pub key: String,
    pub value: Vec<u8>,
    /// Monotonic version stamp assigned by the backend
    pub last_index: u64,
}

impl KVPair {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
        last_index: u64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            last_index,
        }
    }
}

/// Per-write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Expiry window; `Duration::ZERO` means the key never expires
    pub ttl: Duration,
    /// Marks a namespace marker node carrying no payload
    pub is_dir: bool,
}

impl WriteOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, is_dir: false }
    }

    pub fn dir() -> Self {
        Self {
            ttl: Duration::ZERO,
            is_dir: true,
        }
    }

    pub fn expires(&self) -> bool {
        !self.ttl.is_zero()
    }
}

/// Connection parameters handed to a backend constructor.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// `host:port` endpoints
    pub endpoints: Vec<String>,
    /// Client TLS material, present only when fully configured
    pub tls: Option<TlsMaterial>,
    /// Connection establishment timeout
    pub connection_timeout: Duration,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Writes `value` under `key`.
    ///
    /// With a non-zero `options.ttl` the key expires unless rewritten within
    /// the window. `options.is_dir` creates a namespace marker.
    async fn put(
        &self,
        key: &str,
        value: &[u8],
        options: WriteOptions,
    ) -> Result<()>;

    /// Reads the current value of `key`.
    ///
    /// # Errors
    /// - [`crate::StoreError::KeyNotFound`] if the key is absent or expired
    async fn get(
        &self,
        key: &str,
    ) -> Result<KVPair>;

    /// Returns whether `key` currently exists.
    async fn exists(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Subscribes to value changes of `key`.
    ///
    /// The current value is delivered first. The stream closes when `cancel`
    /// fires or the backend subscription is lost.
    ///
    /// # Errors
    /// - [`crate::StoreError::KeyNotFound`] if the key does not exist
    async fn watch(
        &self,
        key: &str,
        cancel: CancellationToken,
    ) -> Result<KvWatchStream>;

    /// Subscribes to changes below `directory`.
    ///
    /// The current children are delivered first, then the full child listing
    /// after every change. The stream closes when `cancel` fires or the
    /// backend subscription is lost.
    ///
    /// # Errors
    /// - [`crate::StoreError::KeyNotFound`] if the directory does not exist
    async fn watch_tree(
        &self,
        directory: &str,
        cancel: CancellationToken,
    ) -> Result<KvTreeWatchStream>;
}
