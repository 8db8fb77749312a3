use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Discovery;
use crate::{decode_entries, DiscoveryError, Entries, KvTreeWatchStream, Result, WriteOptions};

type EntriesSender = mpsc::Sender<Result<Entries>>;

impl Discovery {
    /// Watches the nodes directory until `cancel` fires.
    ///
    /// Every change below the namespace yields the decoded set of currently
    /// registered entries. Faults share the stream: store errors, decode
    /// errors and [`DiscoveryError::WatchException`] whenever the
    /// subscription fails or ends. After a `WatchException` the loop waits
    /// one heartbeat and subscribes again, without a retry ceiling.
    ///
    /// The stream closes once `cancel` fires.
    pub fn watch_nodes(
        &self,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Result<Entries>> {
        let (out, rx) = mpsc::channel(self.channel_capacity);
        let this = self.clone();
        tokio::spawn(async move {
            this.watch_nodes_loop(out, cancel).await;
        });
        rx
    }

    async fn watch_nodes_loop(
        self,
        out: EntriesSender,
        cancel: CancellationToken,
    ) {
        info!(namespace = %self.nspath, "watch nodes loop started");

        loop {
            if !self.ensure_namespace(&out).await {
                break;
            }

            match self.store.watch_tree(&self.nspath, cancel.clone()).await {
                Ok(stream) => {
                    if !self.watch_once(stream, &out, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(namespace = %self.nspath, error = %e, "tree watch subscription failed");
                    if out.send(Err(e)).await.is_err() {
                        break;
                    }
                }
            }

            warn!(namespace = %self.nspath, "tree watch lost, resubscribing after heartbeat");
            if out.send(Err(DiscoveryError::WatchException.into())).await.is_err() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.heartbeat) => {}
            }
        }

        info!(namespace = %self.nspath, "watch nodes loop stopped");
    }

    /// Creates the nodes directory if absent. Failures are reported and the
    /// subscription is attempted anyway.
    ///
    /// Returns false once the output receiver is gone.
    async fn ensure_namespace(
        &self,
        out: &EntriesSender,
    ) -> bool {
        let exists = match self.store.exists(&self.nspath).await {
            Ok(exists) => exists,
            Err(e) => {
                if out.send(Err(e)).await.is_err() {
                    return false;
                }
                false
            }
        };

        if !exists {
            debug!(namespace = %self.nspath, "creating namespace directory");
            if let Err(e) = self.store.put(&self.nspath, &[], WriteOptions::dir()).await {
                if out.send(Err(e)).await.is_err() {
                    return false;
                }
            }
        }
        true
    }

    /// Forwards batches of one subscription.
    ///
    /// Returns true when the subscription ended and should be renewed, false
    /// when the loop must stop.
    async fn watch_once(
        &self,
        mut stream: KvTreeWatchStream,
        out: &EntriesSender,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let pairs = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                pairs = stream.recv() => pairs,
            };

            let Some(pairs) = pairs else {
                return !cancel.is_cancelled();
            };

            let values = self.fetch_values(&pairs).await;
            let batch = decode_entries(values);
            match &batch {
                Ok(entries) => debug!(nodes = entries.len(), "node set changed"),
                Err(e) => warn!(error = %e, "failed to decode node set"),
            }

            if out.send(batch).await.is_err() {
                return false;
            }
        }
    }
}
