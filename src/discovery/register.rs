use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::Discovery;
use crate::{encode_entry, DiscoveryError, Entry, Error, WriteOptions};

impl Discovery {
    /// Publishes `key` with `data` every heartbeat until `cancel` fires.
    ///
    /// The first write happens one full heartbeat after the call. Each write
    /// carries the configured ttl, so the entry disappears once the loop
    /// stops refreshing it.
    ///
    /// The returned stream carries:
    /// - [`DiscoveryError::InvalidKey`] for a blank key, the loop never starts
    /// - [`DiscoveryError::InvalidEntry`] if the entry cannot be encoded
    /// - store errors of failed writes, the loop keeps going
    /// - exactly one [`DiscoveryError::RegisterLoopStopped`] after `cancel`,
    ///   then the stream closes
    pub fn register(
        &self,
        key: &str,
        data: impl Into<Vec<u8>>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Error> {
        let (errors, rx) = mpsc::channel(self.channel_capacity);
        let this = self.clone();
        let key = key.to_string();
        let data = data.into();

        tokio::spawn(async move {
            this.register_loop(key, data, errors, cancel).await;
        });
        rx
    }

    async fn register_loop(
        self,
        key: String,
        data: Vec<u8>,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) {
        if key.trim().is_empty() {
            let _ = errors.send(DiscoveryError::InvalidKey.into()).await;
            return;
        }

        let buf = match encode_entry(&Entry::new(key.clone(), data)) {
            Ok(buf) => buf,
            Err(e) => {
                debug!(key = %key, error = %e, "entry encoding failed");
                let _ = errors.send(DiscoveryError::InvalidEntry.into()).await;
                return;
            }
        };

        let path = self.node_path(&key);
        let options = WriteOptions::with_ttl(self.ttl);
        let mut ticker = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(key = %key, path = %path, heartbeat = ?self.heartbeat, ttl = ?self.ttl, "register loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(key = %key, "register loop stopped");
                    let _ = errors.send(DiscoveryError::RegisterLoopStopped.into()).await;
                    return;
                }
                _ = ticker.tick() => {
                    trace!(path = %path, "heartbeat write");
                    if let Err(e) = self.store.put(&path, &buf, options).await {
                        warn!(path = %path, error = %e, "heartbeat write failed");
                        // A dropped receiver does not stop registration
                        let _ = errors.send(e).await;
                    }
                }
            }
        }
    }
}
