use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;
use crate::observability::SWEPT_TOTAL;

/// Complete every approved reservation whose interval has ended by `now`.
/// Returns how many were completed.
pub async fn sweep_once(engine: &Engine, now: Ms) -> usize {
    let mut completed = 0;
    for id in engine.collect_elapsed(now) {
        match engine.complete(id).await {
            Ok(_) => completed += 1,
            // Cancelled or already completed in the meantime.
            Err(e) => tracing::debug!("sweeper skip {id}: {e}"),
        }
    }
    if completed > 0 {
        metrics::counter!(SWEPT_TOTAL).increment(completed as u64);
        info!("completed {completed} elapsed reservation(s)");
    }
    completed
}

/// Background task that periodically completes elapsed reservations.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        sweep_once(&engine, crate::engine::now_ms()).await;
    }
}

/// Background task that compacts the journal once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, retention_ms: Ms) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal(retention_ms).await {
            tracing::error!("journal compaction failed: {e}");
        }
    }
}
