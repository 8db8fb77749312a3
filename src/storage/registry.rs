//! Backend registry
//!
//! Maps backend names to asynchronous store constructors. Registries are
//! immutable once built and cheap to clone, so one instance can be shared by
//! every [`crate::Discovery`] of a process without global state.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::constants::{BACKEND_ETCD, BACKEND_MEMORY};
use crate::{DiscoveryError, EtcdStore, MemoryStore, Result, Store, StoreConfig};

/// Expiry sweep period of stores opened through the `memory` backend
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub type StoreFuture = BoxFuture<'static, Result<Arc<dyn Store>>>;

/// Builds a connected store from its connection parameters.
pub type StoreConstructor = Arc<dyn Fn(StoreConfig) -> StoreFuture + Send + Sync>;

#[derive(Clone)]
pub struct BackendRegistry {
    constructors: Arc<HashMap<String, StoreConstructor>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BackendRegistry").field("backends", &self.backends()).finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Registry holding the bundled `etcd` and `memory` backends.
    pub fn with_defaults() -> Self {
        Self::builder().with_default_backends().build()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Opens a store through the constructor registered under `name`.
    ///
    /// # Errors
    /// - [`DiscoveryError::UnknownBackend`] if nothing is registered under `name`
    /// - any error of the backend constructor
    pub async fn open(
        &self,
        name: &str,
        config: StoreConfig,
    ) -> Result<Arc<dyn Store>> {
        let constructor = self
            .constructors
            .get(name)
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownBackend(name.to_string()))?;

        debug!(backend = name, endpoints = ?config.endpoints, "opening store backend");
        constructor(config).await
    }
}

#[derive(Default)]
pub struct BackendRegistryBuilder {
    constructors: HashMap<String, StoreConstructor>,
}

impl BackendRegistryBuilder {
    /// Registers `constructor` under `name`, replacing any previous one.
    pub fn register<F, Fut>(
        mut self,
        name: impl Into<String>,
        constructor: F,
    ) -> Self
    where
        F: Fn(StoreConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Store>>> + Send + 'static,
    {
        let constructor: StoreConstructor =
            Arc::new(move |config: StoreConfig| constructor(config).boxed());
        self.constructors.insert(name.into(), constructor);
        self
    }

    pub fn with_default_backends(self) -> Self {
        self.register(BACKEND_ETCD, |config: StoreConfig| async move {
            EtcdStore::connect(&config)
                .await
                .map(|store| Arc::new(store) as Arc<dyn Store>)
        })
        .register(BACKEND_MEMORY, |_config: StoreConfig| async move {
            let store = MemoryStore::new();
            store.spawn_expiry_sweeper(MEMORY_SWEEP_INTERVAL);
            Ok::<_, crate::Error>(Arc::new(store) as Arc<dyn Store>)
        })
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            constructors: Arc::new(self.constructors),
        }
    }
}
