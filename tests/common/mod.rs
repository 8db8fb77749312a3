use std::collections::HashMap;
use std::time::Duration;

use kv_discovery::{BackendRegistry, Discovery, Entries, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const HEARTBEAT: Duration = Duration::from_secs(1);
pub const TTL: Duration = Duration::from_secs(3);

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Discovery over a fresh in-memory store under the `it` prefix.
pub async fn memory_discovery(kv_path: &str) -> Result<Discovery> {
    let options = HashMap::from([("kv.path".to_string(), kv_path.to_string())]);
    Discovery::initialize(
        &BackendRegistry::with_defaults(),
        "memory",
        "127.0.0.1:2379/it",
        HEARTBEAT,
        TTL,
        &options,
    )
    .await
}

/// Reads node-set batches until one satisfies `done`; faults are skipped.
pub async fn wait_for_nodes<F>(
    rx: &mut mpsc::Receiver<Result<Entries>>,
    done: F,
) -> Entries
where
    F: Fn(&Entries) -> bool,
{
    timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Some(Ok(entries)) if done(&entries) => return entries,
                Some(_) => continue,
                None => panic!("node stream closed"),
            }
        }
    })
    .await
    .expect("node set never reached the expected state")
}
