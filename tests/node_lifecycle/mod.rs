use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::{enable_logger, memory_discovery, wait_for_nodes, HEARTBEAT, TTL};
use kv_discovery::{Discovery, DiscoveryError, Error};

#[tokio::test(start_paused = true)]
async fn test_registered_nodes_appear_and_expire() {
    enable_logger();
    let discovery = memory_discovery("services/web").await.unwrap();
    assert_eq!(discovery.namespace(), "it/services/web/nodes");

    let watch_cancel = CancellationToken::new();
    let mut nodes = discovery.watch_nodes(watch_cancel.clone());

    let cancel_a = CancellationToken::new();
    let cancel_b = CancellationToken::new();
    let mut faults_a = discovery.register("node-a", b"10.0.0.1:80".to_vec(), cancel_a.clone());
    let _faults_b = discovery.register("node-b", b"10.0.0.2:80".to_vec(), cancel_b.clone());

    let entries = wait_for_nodes(&mut nodes, |e| e.len() == 2).await;
    assert_eq!(entries.keys(), vec!["node-a", "node-b"]);
    assert_eq!(entries.get("node-a").unwrap().data, b"10.0.0.1:80".to_vec());

    // node-a stops refreshing and disappears once its ttl runs out
    cancel_a.cancel();
    assert!(matches!(
        faults_a.recv().await,
        Some(Error::Discovery(DiscoveryError::RegisterLoopStopped))
    ));

    let entries = wait_for_nodes(&mut nodes, |e| e.keys() == vec!["node-b"]).await;
    assert!(entries.get("node-a").is_none());

    cancel_b.cancel();
    watch_cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_namespaces_sharing_a_store_are_isolated() {
    enable_logger();
    let web = memory_discovery("services/web").await.unwrap();
    let db = Discovery::with_store(web.store().clone(), HEARTBEAT, TTL, "it/services/db/nodes")
        .unwrap();

    let cancel = CancellationToken::new();
    let mut db_nodes = db.watch_nodes(cancel.clone());
    assert!(db_nodes.recv().await.unwrap().unwrap().is_empty());

    let _faults = web.register("node-a", b"web".to_vec(), cancel.clone());
    let mut web_nodes = web.watch_nodes(cancel.clone());
    let entries = wait_for_nodes(&mut web_nodes, |e| !e.is_empty()).await;
    assert_eq!(entries.keys(), vec!["node-a"]);

    // Writes below the web namespace never reach the db watcher
    assert!(timeout(Duration::from_secs(5), db_nodes.recv()).await.is_err());

    cancel.cancel();
}
