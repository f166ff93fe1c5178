//! Metrics collection and exposition.
//!
//! # Metrics
//! - `distributor_requests_total` (counter): requests by method, status, backend
//! - `distributor_request_duration_seconds` (histogram): end-to-end latency
//! - `distributor_backend_health` (gauge): 1=healthy, 0=unhealthy, per backend
//! - `distributor_healthy_backends` (gauge): size of the current generation
//! - `distributor_health_sweep_seconds` (histogram): duration of one sweep
//! - `distributor_rate_limited_total` (counter): rejected admissions
//! - `distributor_rate_limit_clients` (gauge): tracked client buckets
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "distributor_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!("distributor_request_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    metrics::gauge!("distributor_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_health_sweep(healthy: usize, elapsed: Duration) {
    metrics::gauge!("distributor_healthy_backends").set(healthy as f64);
    metrics::histogram!("distributor_health_sweep_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("distributor_rate_limited_total").increment(1);
}

pub fn record_rate_limit_clients(count: usize) {
    metrics::gauge!("distributor_rate_limit_clients").set(count as f64);
}
