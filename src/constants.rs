// -
// Namespace layout

/// Namespace base used when `kv.path` is not configured
pub(crate) const DEFAULT_DISCOVERY_PATH: &str = "discovery/service";

/// Directory under the namespace base holding one entry per node
pub(crate) const NODES_DIR: &str = "nodes";

// -
// Recognized option keys

pub const OPTION_KV_PATH: &str = "kv.path";
pub const OPTION_KV_CACERTFILE: &str = "kv.cacertfile";
pub const OPTION_KV_CERTFILE: &str = "kv.certfile";
pub const OPTION_KV_KEYFILE: &str = "kv.keyfile";

// -
// Backend names

pub const BACKEND_ETCD: &str = "etcd";
pub const BACKEND_MEMORY: &str = "memory";

// -
// Defaults

/// Backoff between single-key watch resubscriptions
pub(crate) const DEFAULT_WATCH_RETRY_MS: u64 = 5000;

/// Capacity of the per-loop output channels
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Capacity of each memory-store watcher channel
pub(crate) const DEFAULT_WATCHER_BUFFER_SIZE: usize = 64;
