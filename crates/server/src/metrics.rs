//! Prometheus metrics for the promhub server.
//!
//! Covers registry writes, discovery reads and proxied scrapes.
//!
//! The `/metrics` endpoint is unauthenticated so the same Prometheus that
//! consumes discovery can scrape it. No credentials or addresses end up in
//! label values.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Registry metrics
pub static TARGETS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "promhub_targets_created_total",
        "Total number of targets inserted as new rows",
    )
    .expect("metric creation failed")
});

pub static TARGETS_MERGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "promhub_targets_merged_total",
        "Total number of submitted targets merged into an existing row",
    )
    .expect("metric creation failed")
});

// Discovery metrics
pub static DISCOVERY_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "promhub_discovery_requests_total",
        "Total number of discovery requests served",
    )
    .expect("metric creation failed")
});

// Proxy metrics
pub static PROXY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "promhub_proxy_requests_total",
            "Total proxied scrapes by response status class",
        ),
        &["class"],
    )
    .expect("metric creation failed")
});

pub static PROXY_UPSTREAM_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "promhub_proxy_upstream_errors_total",
        "Total proxied scrapes that failed to reach the upstream",
    )
    .expect("metric creation failed")
});

pub static PROXY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "promhub_proxy_duration_seconds",
            "Time until the upstream response headers arrived",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(TARGETS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TARGETS_MERGED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DISCOVERY_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROXY_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROXY_UPSTREAM_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROXY_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a proxied scrape by status class (`2xx`, `4xx`, ...).
pub fn record_proxy_status(status: StatusCode) {
    let class = match status.as_u16() / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        _ => "5xx",
    };
    PROXY_REQUESTS.with_label_values(&[class]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_proxy_status_classes() {
        let before = PROXY_REQUESTS.with_label_values(&["4xx"]).get();
        record_proxy_status(StatusCode::NOT_FOUND);
        assert_eq!(PROXY_REQUESTS.with_label_values(&["4xx"]).get(), before + 1);
    }
}
