//! HTTP metrics collection with Prometheus
//!
//! A small facade over four instruments with a fixed label schema:
//! - `http_requests_total{method, endpoint, status_code}`
//! - `http_request_duration_seconds{method, endpoint, status_code}`
//! - `http_errors_total{error_type, endpoint}`
//! - `external_calls_total{target_service, endpoint}`
//!
//! Instruments are created and registered once at startup; creation failure
//! (e.g. a duplicate name) is surfaced to the caller. Updates are atomic and
//! safe under concurrent invocation from any number of request handlers.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::time::Duration;

/// Metrics recorder for HTTP request handling
#[derive(Clone)]
pub struct HttpMetrics {
    /// Total requests completed
    pub requests_total: CounterVec,
    /// Request duration in seconds
    pub request_duration_seconds: HistogramVec,
    /// Total errors by type
    pub errors_total: CounterVec,
    /// Total outbound calls to downstream services
    pub external_calls_total: CounterVec,
}

impl HttpMetrics {
    /// Create the standard HTTP instruments and register them on `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status_code"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "endpoint", "status_code"],
        )?;

        let errors_total = CounterVec::new(
            Opts::new("http_errors_total", "Total number of HTTP errors"),
            &["error_type", "endpoint"],
        )?;

        let external_calls_total = CounterVec::new(
            Opts::new(
                "external_calls_total",
                "Total number of external service calls",
            ),
            &["target_service", "endpoint"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(external_calls_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            errors_total,
            external_calls_total,
        })
    }

    /// Record a completed HTTP request
    pub fn record_request(&self, method: &str, endpoint: &str, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, endpoint, &status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method, endpoint, &status])
            .observe(duration.as_secs_f64());
    }

    /// Record an HTTP error
    ///
    /// Independent of [`record_request`](Self::record_request): an error
    /// response that is also a completed request needs both calls.
    pub fn record_error(&self, error_type: &str, endpoint: &str) {
        self.errors_total
            .with_label_values(&[error_type, endpoint])
            .inc();
    }

    /// Record an outbound call to a downstream service
    pub fn record_external_call(&self, target_service: &str, endpoint: &str) {
        self.external_calls_total
            .with_label_values(&[target_service, endpoint])
            .inc();
    }
}
