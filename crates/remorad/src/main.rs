//! remorad: Remora remote-execution daemon.

use anyhow::{Context, Result};

use remora_core::config::RemoraConfig;
use remora_services::{CheckpointStore, Engine, PoolSettings, Registry};

mod catalogue;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RemoraConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RemoraConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RemoraConfig::default()
    });

    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.server.bind.clone());
    tracing::info!(bind, "remorad starting");

    // Shared state
    let checkpoints = CheckpointStore::new(&config.checkpoints.path)
        .context("failed to open checkpoint store")?;
    tracing::info!(path = %config.checkpoints.path.display(), "checkpoint store ready");

    let mut registry = Registry::with_builtins();
    catalogue::register(&mut registry);

    let engine = Engine::start(registry, checkpoints, PoolSettings::from(&config.executor));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let mut api_task = {
        let state = remora_api::ApiState::new(engine.clone());
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let stop = async move {
                let _ = shutdown_rx.recv().await;
            };
            if let Err(e) = remora_api::serve(state, &bind, stop).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = &mut api_task      => tracing::error!("API task exited: {:?}", r),
    }

    engine.shutdown().await;
    if !api_task.is_finished() {
        let _ = api_task.await;
    }
    tracing::info!("remorad stopped");
    Ok(())
}
