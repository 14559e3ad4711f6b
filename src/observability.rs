use std::net::SocketAddr;

// ── Service outcomes ────────────────────────────────────────────

/// Counter: reservations written.
pub const RESERVATIONS_CREATED_TOTAL: &str = "sala_reservations_created_total";

/// Counter: reservations cancelled.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "sala_reservations_cancelled_total";

/// Counter: create attempts refused by the rules. Labels: kind.
pub const CONFLICTS_TOTAL: &str = "sala_conflicts_total";

// ── Store collaborator ──────────────────────────────────────────

/// Counter: store calls that failed. Labels: op.
pub const STORE_ERRORS_TOTAL: &str = "sala_store_errors_total";

/// Histogram: store call latency in seconds. Labels: op.
pub const STORE_DURATION_SECONDS: &str = "sala_store_duration_seconds";

/// Gauge: reservations in the service cache after the last reload.
pub const CACHED_RESERVATIONS: &str = "sala_cached_reservations";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "sala_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "sala_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

