use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::{enable_logger, memory_discovery};
use kv_discovery::{Result, WriteOptions};

async fn next(values: &mut mpsc::Receiver<Result<Vec<u8>>>) -> Option<Result<Vec<u8>>> {
    timeout(Duration::from_secs(30), values.recv()).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_watch_extend_follows_config_key_until_cancelled() {
    enable_logger();
    let discovery = memory_discovery("services/web").await.unwrap();
    let store = discovery.store().clone();
    store
        .put("it/config/limits", b"v1", WriteOptions::default())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let mut values = discovery.watch_extend("it/config/limits", cancel.clone());

    assert_eq!(next(&mut values).await.unwrap().unwrap(), b"v1".to_vec());

    store
        .put("it/config/limits", b"v2", WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(next(&mut values).await.unwrap().unwrap(), b"v2".to_vec());

    cancel.cancel();
    assert!(next(&mut values).await.unwrap().unwrap().is_empty());
    assert!(values.recv().await.is_none());
}
