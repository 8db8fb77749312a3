use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::warn;

use super::Discovery;
use crate::KVPair;

impl Discovery {
    /// Reads the current value of every pair's key concurrently.
    ///
    /// One task per key; a failed read is logged and left out, so the result
    /// may be shorter than `pairs`. Order is unspecified.
    pub async fn fetch_values(
        &self,
        pairs: &[KVPair],
    ) -> Vec<Vec<u8>> {
        let collected = Arc::new(Mutex::new(Vec::with_capacity(pairs.len())));

        let tasks = pairs.iter().map(|pair| {
            let store = self.store.clone();
            let collected = collected.clone();
            let key = pair.key.clone();
            tokio::spawn(async move {
                match store.get(&key).await {
                    Ok(current) => collected.lock().push(current.value),
                    Err(e) => warn!(key = %key, error = %e, "discovery fetch failed"),
                }
            })
        });

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                warn!(error = %e, "discovery fetch task aborted");
            }
        }

        let mut values = Vec::new();
        std::mem::swap(&mut values, &mut *collected.lock());
        values
    }
}
