use std::net::SocketAddr;

use crate::engine::EngineError;

/// Counter: reservation attempts. Labels: kind (pt_session, group_class), outcome.
pub const BOOKINGS_TOTAL: &str = "fitclub_bookings_total";

/// Counter: enrollment changes. Labels: kind (enroll, unenroll), outcome.
pub const ENROLLMENTS_TOTAL: &str = "fitclub_enrollments_total";

/// Counter: reservations cancelled (no-op cancels are not counted).
pub const CANCELLATIONS_TOTAL: &str = "fitclub_cancellations_total";

/// Counter: WAL compactions completed.
pub const COMPACTIONS_TOTAL: &str = "fitclub_compactions_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fitclub_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fitclub_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

pub fn record_outcome<T>(counter: &'static str, kind: &'static str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(counter, "kind" => kind, "outcome" => outcome).increment(1);
}
