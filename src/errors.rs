//! Discovery Error Hierarchy
//!
//! Defines the error types surfaced by the discovery orchestrator and its
//! store backends, categorized by layer and by how a long-running loop is
//! expected to react to them.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (store, serialization, TLS material)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Discovery protocol faults reported on the loop streams
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// How a loop treats a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Reported once; the loop never starts.
    Fatal,
    /// Reported; the loop retries at the next tick or after a backoff.
    Transient,
    /// Expected end-of-loop signal after cancellation.
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// Register called with an empty or whitespace-only key
    #[error("discovery: entry key invalid")]
    InvalidKey,

    /// Entry could not be encoded for publishing
    #[error("discovery: entry invalid")]
    InvalidEntry,

    /// Register loop observed its cancellation signal
    #[error("discovery: register loop quit")]
    RegisterLoopStopped,

    /// Tree-watch subscription failed or its stream ended
    #[error("discovery: watch exception")]
    WatchException,

    /// Single-key watch stream ended without a pair
    #[error("discovery: watch pair invalid")]
    InvalidWatchPair,

    /// No constructor registered under this backend name
    #[error("Unknown discovery backend: {0}")]
    UnknownBackend(String),

    /// Endpoint list could not be parsed
    #[error("Invalid discovery uri: {0}")]
    InvalidUri(String),

    /// Heartbeat interval that cannot drive a ticker
    #[error("Invalid heartbeat interval: {0:?}")]
    InvalidHeartbeat(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Store layer
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    //Serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    // TLS material
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key or directory absent in the backend
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Connection establishment failures
    #[error("Failed to connect to {endpoints}: {source}")]
    Connect {
        endpoints: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backend rejected or failed an operation
    #[error("Backend operation `{op}` on {key} failed: {reason}")]
    Operation {
        op: &'static str,
        key: String,
        reason: String,
    },

    /// Store handle is shut down
    #[error("Store is closed")]
    Closed,

    /// etcd client errors
    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),
}

// Serialization is classified separately (entry codec)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Malformed entry: {0}")]
    MalformedEntry(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// TLS file could not be read
    #[error("Failed to read TLS file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TLS file holds no PEM block
    #[error("TLS file {path} is not valid PEM")]
    Malformed { path: PathBuf },
}

impl Error {
    /// Classifies the error the way the discovery loops treat it.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Error::Discovery(DiscoveryError::RegisterLoopStopped) => FaultKind::Terminal,
            Error::Discovery(DiscoveryError::WatchException)
            | Error::Discovery(DiscoveryError::InvalidWatchPair)
            | Error::System(SystemError::Store(_))
            | Error::System(SystemError::Serialization(SerializationError::Bincode(_))) => {
                FaultKind::Transient
            }
            _ => FaultKind::Fatal,
        }
    }

    /// Returns the discovery sentinel carried by this error, if any.
    pub fn discovery(&self) -> Option<&DiscoveryError> {
        match self {
            Error::Discovery(e) => Some(e),
            _ => None,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::System(SystemError::Store(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        Error::System(SystemError::Tls(e))
    }
}

impl From<etcd_client::Error> for Error {
    fn from(e: etcd_client::Error) -> Self {
        Error::System(SystemError::Store(StoreError::Etcd(e)))
    }
}
