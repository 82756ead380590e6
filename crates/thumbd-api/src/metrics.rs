//! Prometheus metrics for the worker.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "thumbd_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "thumbd_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "thumbd_http_requests_in_flight";

    // Pipeline and engine metrics, re-exported from the crates that record them.
    pub use thumbd_engine::COMMANDS_TOTAL_METRIC as ENGINE_COMMANDS_TOTAL;
    pub use thumbd_pipeline::{
        CACHE_HITS_METRIC as CACHE_HITS_TOTAL, CACHE_MISSES_METRIC as CACHE_MISSES_TOTAL,
        GENERATED_METRIC as THUMBNAILS_GENERATED_TOTAL,
    };
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
