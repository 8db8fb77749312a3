//! Service discovery on top of a distributed key-value store.
//!
//! Nodes publish themselves with [`Discovery::register`], which rewrites a
//! TTL-bound entry every heartbeat. Observers follow the node set with
//! [`Discovery::watch_nodes`] or a single key with [`Discovery::watch_extend`].
//! Stores are opened by name through a [`BackendRegistry`].

mod config;
mod discovery;
mod entry;
mod errors;
mod storage;

pub mod constants;
pub mod utils;

pub use config::*;
pub use discovery::*;
pub use entry::*;
pub use errors::*;
pub use storage::*;
