use std::env;

use kv_discovery::{BackendRegistry, Discovery, DiscoveryConfig, FaultKind, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let config_path = env::args().nth(1);
    let settings = DiscoveryConfig::load(config_path.as_deref())?;

    let discovery = Discovery::from_config(&BackendRegistry::with_defaults(), &settings).await?;

    // Shutdown signal shared by every loop
    let shutdown = CancellationToken::new();

    let mut register_handle = None;
    if let Some(node) = &settings.node {
        let mut faults = discovery.register(&node.key, node.data.as_bytes(), shutdown.clone());
        let key = node.key.clone();
        register_handle = Some(tokio::spawn(async move {
            while let Some(e) = faults.recv().await {
                match e.fault_kind() {
                    FaultKind::Terminal => info!(key = %key, "registration stopped"),
                    FaultKind::Transient => warn!(key = %key, error = %e, "registration fault"),
                    FaultKind::Fatal => error!(key = %key, error = %e, "registration aborted"),
                }
            }
        }));
    }

    let mut nodes = discovery.watch_nodes(shutdown.clone());
    let watch_handle = tokio::spawn(async move {
        while let Some(batch) = nodes.recv().await {
            match batch {
                Ok(entries) => info!(nodes = ?entries.keys(), "node set"),
                Err(e) => warn!(error = %e, "watch fault"),
            }
        }
    });

    info!(namespace = discovery.namespace(), "Discovery started. Waiting for CTRL+C signal...");
    if let Err(e) = graceful_shutdown(shutdown.clone()).await {
        error!("Failed to listen for shutdown signals: {:?}", e);
        shutdown.cancel();
    }

    if let Some(handle) = register_handle {
        let _ = handle.await;
    }
    let _ = watch_handle.await;

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(shutdown: CancellationToken) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    shutdown.cancel();
    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
