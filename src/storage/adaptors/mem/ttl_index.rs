//! Expiry index for keys written with a TTL.
//!
//! Two-way index: time→keys for range scans of expired keys, and key→time
//! for cancelling an expiry when a key is rewritten. Uses the tokio clock so
//! paused-time tests drive expiry deterministically.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

#[derive(Debug, Default)]
pub(crate) struct TtlIndex {
    /// Index: expiration_time -> keys expiring at that time
    expirations: BTreeMap<Instant, Vec<String>>,

    /// Reverse index: key -> expiration_time
    key_to_expiry: HashMap<String, Instant>,
}

impl TtlIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the expiry of `key`, replacing any previous one.
    pub(crate) fn register(
        &mut self,
        key: String,
        expire_at: Instant,
    ) {
        self.unregister(&key);
        self.expirations.entry(expire_at).or_default().push(key.clone());
        self.key_to_expiry.insert(key, expire_at);
    }

    /// Removes the expiry of `key` (rewrite without TTL or delete).
    pub(crate) fn unregister(
        &mut self,
        key: &str,
    ) {
        if let Some(expire_at) = self.key_to_expiry.remove(key) {
            if let Some(keys) = self.expirations.get_mut(&expire_at) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.expirations.remove(&expire_at);
                }
            }
        }
    }

    /// Drains every key expired at or before `now`.
    pub(crate) fn take_expired(
        &mut self,
        now: Instant,
    ) -> Vec<String> {
        let expired_times: Vec<Instant> = self.expirations.range(..=now).map(|(t, _)| *t).collect();

        let mut expired_keys = Vec::new();
        for time in expired_times {
            if let Some(keys) = self.expirations.remove(&time) {
                for key in &keys {
                    self.key_to_expiry.remove(key);
                }
                expired_keys.extend(keys);
            }
        }
        expired_keys
    }

    /// O(1) check against the earliest expiry.
    pub(crate) fn may_have_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.expirations
            .keys()
            .next()
            .map(|first| *first <= now)
            .unwrap_or(false)
    }

    pub(crate) fn expiration(
        &self,
        key: &str,
    ) -> Option<Instant> {
        self.key_to_expiry.get(key).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.key_to_expiry.len()
    }
}
