use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation submissions. Labels: outcome (pending, approved, contested, conflict).
pub const RESERVATIONS_TOTAL: &str = "slotguard_reservations_total";

/// Counter: lifecycle transitions. Labels: from, to.
pub const TRANSITIONS_TOTAL: &str = "slotguard_transitions_total";

/// Counter: override approvals that displaced at least one reservation.
pub const OVERRIDES_TOTAL: &str = "slotguard_overrides_total";

/// Counter: lifecycle operations refused. Labels: kind (conflict, invalid_transition, ...).
pub const REJECTIONS_TOTAL: &str = "slotguard_rejections_total";

/// Counter: reservations cancelled by overrides.
pub const DISPLACED_TOTAL: &str = "slotguard_displaced_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a resource lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "slotguard_lock_wait_seconds";

/// Gauge: resources with engine state.
pub const RESOURCES_TRACKED: &str = "slotguard_resources_tracked";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotguard_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotguard_wal_flush_batch_size";

/// Counter: journal compactions.
pub const COMPACTIONS_TOTAL: &str = "slotguard_compactions_total";

/// Counter: reservations completed by the sweeper.
pub const SWEPT_TOTAL: &str = "slotguard_swept_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
