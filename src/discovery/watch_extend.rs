use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Discovery;
use crate::{DiscoveryError, KvWatchStream, Result};

type ValueSender = mpsc::Sender<Result<Vec<u8>>>;

enum SubscriptionEnd {
    /// Backend closed the stream
    Lost,
    Cancelled,
    /// Output receiver dropped
    Abandoned,
}

impl Discovery {
    /// Watches a single full-path `key` until `cancel` fires.
    ///
    /// A value is forwarded only when its `last_index` is strictly greater
    /// than the last forwarded one. A lost subscription is reported as
    /// [`DiscoveryError::InvalidWatchPair`], a failed one with its store
    /// error; both are retried after the watch retry backoff.
    ///
    /// On cancellation one empty value is sent as shutdown marker before the
    /// stream closes.
    pub fn watch_extend(
        &self,
        key: &str,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Result<Vec<u8>>> {
        let (out, rx) = mpsc::channel(self.channel_capacity);
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            this.watch_extend_loop(key, out, cancel).await;
        });
        rx
    }

    async fn watch_extend_loop(
        self,
        key: String,
        out: ValueSender,
        cancel: CancellationToken,
    ) {
        info!(key = %key, "watch extend loop started");
        let mut last_index = 0u64;

        loop {
            match self.store.watch(&key, cancel.clone()).await {
                Ok(stream) => match forward_newer(stream, &mut last_index, &out, &cancel).await {
                    SubscriptionEnd::Lost => {
                        warn!(key = %key, "key watch lost");
                        if out.send(Err(DiscoveryError::InvalidWatchPair.into())).await.is_err() {
                            return;
                        }
                    }
                    SubscriptionEnd::Cancelled => break,
                    SubscriptionEnd::Abandoned => return,
                },
                Err(e) => {
                    warn!(key = %key, error = %e, "key watch subscription failed");
                    if out.send(Err(e)).await.is_err() {
                        return;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.watch_retry) => {}
            }
        }

        info!(key = %key, "watch extend loop stopped");
        let _ = out.send(Ok(Vec::new())).await;
    }
}

async fn forward_newer(
    mut stream: KvWatchStream,
    last_index: &mut u64,
    out: &ValueSender,
    cancel: &CancellationToken,
) -> SubscriptionEnd {
    loop {
        let pair = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SubscriptionEnd::Cancelled,
            pair = stream.recv() => pair,
        };

        let Some(pair) = pair else {
            if cancel.is_cancelled() {
                return SubscriptionEnd::Cancelled;
            }
            return SubscriptionEnd::Lost;
        };

        if pair.last_index <= *last_index {
            debug!(key = %pair.key, last_index = pair.last_index, "stale value suppressed");
            continue;
        }

        *last_index = pair.last_index;
        if out.send(Ok(pair.value)).await.is_err() {
            return SubscriptionEnd::Abandoned;
        }
    }
}
