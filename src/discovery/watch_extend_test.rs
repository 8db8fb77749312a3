use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    Discovery, DiscoveryError, Error, KVPair, MemoryStore, MockStore, Result, Store, StoreError,
    SystemError, WriteOptions,
};

async fn next(rx: &mut mpsc::Receiver<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("watch_extend produced nothing")
        .expect("watch_extend stream closed")
}

#[tokio::test(start_paused = true)]
async fn test_only_strictly_newer_versions_are_forwarded() {
    let (tx, watch_rx) = mpsc::channel(8);
    tx.send(KVPair::new("cfg/x", b"v3".to_vec(), 3)).await.unwrap();
    tx.send(KVPair::new("cfg/x", b"v3-again".to_vec(), 3)).await.unwrap();
    tx.send(KVPair::new("cfg/x", b"v7".to_vec(), 7)).await.unwrap();
    drop(tx);

    let mut first = Some(watch_rx);
    let mut store = MockStore::new();
    store
        .expect_watch()
        .withf(|key: &str, _: &CancellationToken| key == "cfg/x")
        .returning(move |key: &str, _| match first.take() {
            Some(rx) => Ok(rx),
            None => Err(StoreError::KeyNotFound(key.to_string()).into()),
        });

    let discovery = Discovery::with_store(
        Arc::new(store),
        Duration::from_secs(1),
        Duration::from_secs(5),
        "ns",
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut rx = discovery.watch_extend("cfg/x", cancel.clone());

    assert_eq!(next(&mut rx).await.unwrap(), b"v3".to_vec());
    assert_eq!(next(&mut rx).await.unwrap(), b"v7".to_vec());
    assert!(matches!(
        next(&mut rx).await,
        Err(Error::Discovery(DiscoveryError::InvalidWatchPair))
    ));

    // Retried after the backoff; the failing subscription is reported as is
    assert!(matches!(
        next(&mut rx).await,
        Err(Error::System(SystemError::Store(StoreError::KeyNotFound(_))))
    ));

    cancel.cancel();
    assert_eq!(next(&mut rx).await.unwrap(), Vec::<u8>::new());
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resubscription_does_not_repeat_forwarded_value() {
    let store = MemoryStore::new();
    store.put("cfg/x", b"one", WriteOptions::default()).await.unwrap();

    let discovery = Discovery::with_store(
        Arc::new(store.clone()),
        Duration::from_secs(1),
        Duration::from_secs(5),
        "ns",
    )
    .unwrap()
    .with_watch_retry(Duration::from_secs(2));
    let cancel = CancellationToken::new();
    let mut rx = discovery.watch_extend("cfg/x", cancel.clone());

    assert_eq!(next(&mut rx).await.unwrap(), b"one".to_vec());
    store.put("cfg/x", b"two", WriteOptions::default()).await.unwrap();
    assert_eq!(next(&mut rx).await.unwrap(), b"two".to_vec());

    store.disconnect_watchers();
    assert!(matches!(
        next(&mut rx).await,
        Err(Error::Discovery(DiscoveryError::InvalidWatchPair))
    ));

    // Resubscribed after 2s; "two" is delivered again by the store but suppressed
    sleep(Duration::from_secs(3)).await;
    store.put("cfg/x", b"three", WriteOptions::default()).await.unwrap();
    assert_eq!(next(&mut rx).await.unwrap(), b"three".to_vec());

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_emits_one_empty_value_then_closes() {
    let store = MemoryStore::new();
    store.put("cfg/x", b"one", WriteOptions::default()).await.unwrap();
    let discovery = Discovery::with_store(
        Arc::new(store),
        Duration::from_secs(1),
        Duration::from_secs(5),
        "ns",
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let mut rx = discovery.watch_extend("cfg/x", cancel.clone());
    assert_eq!(next(&mut rx).await.unwrap(), b"one".to_vec());

    cancel.cancel();

    assert!(next(&mut rx).await.unwrap().is_empty());
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_is_retried_until_it_appears() {
    let store = MemoryStore::new();
    let discovery = Discovery::with_store(
        Arc::new(store.clone()),
        Duration::from_secs(1),
        Duration::from_secs(5),
        "ns",
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let mut rx = discovery.watch_extend("cfg/late", cancel.clone());
    assert!(matches!(
        next(&mut rx).await,
        Err(Error::System(SystemError::Store(StoreError::KeyNotFound(_))))
    ));

    store.put("cfg/late", b"here", WriteOptions::default()).await.unwrap();
    assert_eq!(next(&mut rx).await.unwrap(), b"here".to_vec());

    cancel.cancel();
}
