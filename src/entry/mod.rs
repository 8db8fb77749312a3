//! Entry codec
//!
//! One [`Entry`] is the record a node publishes under `namespace/<key>`.
//! Entries travel through the store as bincode-encoded bytes; the
//! orchestrator only relies on [`encode_entry`] and [`decode_entries`]
//! round-tripping.


use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::Result;
use crate::SerializationError;

/// A published node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique node key inside the namespace
    pub key: String,
    /// Opaque node payload, may be empty
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(
        key: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }
}

/// Unordered set of entries decoded from one watch batch.
///
/// Rebuilt from scratch on every notification; never diffed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries(Vec<Entry>);

impl Entries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    /// Finds the entry published under `key`.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Entry> {
        self.0.iter().find(|e| e.key == key)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.get(key).is_some()
    }

    /// Entry keys, sorted for stable comparison.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.iter().map(|e| e.key.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn into_inner(self) -> Vec<Entry> {
        self.0
    }
}

impl From<Vec<Entry>> for Entries {
    fn from(entries: Vec<Entry>) -> Self {
        Entries(entries)
    }
}

impl IntoIterator for Entries {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Encodes an entry into its wire form.
///
/// # Errors
/// - [`SerializationError::MalformedEntry`] if the key is blank
/// - [`SerializationError::Bincode`] if serialization fails
pub fn encode_entry(entry: &Entry) -> Result<Vec<u8>> {
    if entry.key.trim().is_empty() {
        return Err(SerializationError::MalformedEntry("blank key".to_string()).into());
    }
    let buf = bincode::serialize(entry).map_err(SerializationError::from)?;
    Ok(buf)
}

/// Decodes a batch of raw values into entries.
///
/// Empty values are directory markers or deleted nodes and are skipped. Any
/// other value that does not decode fails the whole batch.
pub fn decode_entries<I, V>(values: I) -> Result<Entries>
where
    I: IntoIterator<Item = V>,
    V: AsRef<[u8]>,
{
    let mut entries = Vec::new();
    for value in values {
        let value = value.as_ref();
        if value.is_empty() {
            trace!("skip empty value while decoding entries");
            continue;
        }
        let entry: Entry = bincode::deserialize(value).map_err(SerializationError::from)?;
        entries.push(entry);
    }
    Ok(Entries(entries))
}
