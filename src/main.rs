use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use slotguard::config::Config;
use slotguard::engine::Engine;
use slotguard::maintenance;
use slotguard::notify::{self, LogDispatcher, NotifyHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    slotguard::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::with_settings(
        config.journal_path(),
        hub.clone(),
        config.engine_settings(),
    )?);

    info!("slotguard engine ready");
    info!("  journal: {}", config.journal_path().display());
    info!("  resources: {}", engine.list_resources().len());
    info!("  require_approval: {}", config.require_approval);
    info!("  park_contested: {}", config.park_contested);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let dispatcher = notify::spawn_dispatcher(&hub, Arc::new(LogDispatcher));
    let sweeper = tokio::spawn(maintenance::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(maintenance::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.retention_ms,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");

    sweeper.abort();
    compactor.abort();
    match engine.compact_wal(config.retention_ms).await {
        Ok(stats) => info!("final compaction kept {} record(s)", stats.records),
        Err(e) => tracing::error!("final compaction failed: {e}"),
    }
    dispatcher.abort();

    info!("slotguard stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
