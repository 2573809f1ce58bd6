use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: allocation mutations sent. Labels: kind, status.
pub const MUTATIONS_TOTAL: &str = "seasonal_mutations_total";

/// Histogram: mutation round-trip latency in seconds. Labels: kind.
pub const MUTATION_DURATION_SECONDS: &str = "seasonal_mutation_duration_seconds";

/// Counter: mutations refused locally before any request. Labels: kind.
pub const LOCAL_REJECTIONS_TOTAL: &str = "seasonal_local_rejections_total";

/// Counter: round re-queries. Labels: status.
pub const REFRESHES_TOTAL: &str = "seasonal_refreshes_total";

/// Histogram: round re-query latency in seconds.
pub const REFRESH_DURATION_SECONDS: &str = "seasonal_refresh_duration_seconds";

// ── USE metrics (session utilization) ──────────────────────────

/// Gauge: requests currently in flight across sessions.
pub const IN_FLIGHT_REQUESTS: &str = "seasonal_in_flight_requests";

/// Counter: invalidation events received from other sessions.
pub const INVALIDATIONS_TOTAL: &str = "seasonal_invalidations_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an allocation error, for metrics.
pub fn error_label(err: &crate::session::AllocationError) -> &'static str {
    use crate::session::{AllocationError, Rejection};
    match err {
        AllocationError::InvalidLocalState(_) => "invalid_local_state",
        AllocationError::AlreadySubmitting => "already_submitting",
        AllocationError::NotFound => "not_found",
        AllocationError::Transport(_) => "transport",
        AllocationError::Rejected(Rejection::Unrecognized(_)) => "rejected_unrecognized",
        AllocationError::Rejected(_) => "rejected",
    }
}
