//! Standard HTTP request metrics
//!
//! [`HttpMetrics`] registers the usual request metrics and produces
//! [`RequestMetricsCallbacks`] that feed them:
//!
//! - `http_requests_total{method,path,status}`
//! - `http_request_duration_seconds{method,path}`
//! - `http_requests_in_progress{method,path}`
//! - `http_errors_total{error_type,path}`
//!
//! ```rust,ignore
//! let http = HttpMetrics::register(&registry, Some(config.metrics.duration_buckets.as_slice()))?;
//! let router = router.layer(RequestMetricsLayer::new(http.callbacks()));
//! ```

use std::sync::Arc;

use tracing::warn;

use super::metrics::{Counter, Gauge, Histogram};
use super::registry::MetricRegistry;
use crate::error::Result;
use crate::middleware::RequestMetricsCallbacks;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const REQUESTS_IN_PROGRESS: &str = "http_requests_in_progress";
pub const ERRORS_TOTAL: &str = "http_errors_total";

/// Request metrics shared by every request passing the layer
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    requests: Counter,
    duration: Histogram,
    in_progress: Gauge,
    errors: Counter,
}

impl HttpMetrics {
    /// Register (or reuse) the request metrics; `buckets` of `None` keeps the
    /// backend's default duration buckets
    pub fn register(registry: &MetricRegistry, buckets: Option<&[f64]>) -> Result<Self> {
        Ok(Self {
            requests: registry.get_or_create_counter(
                REQUESTS_TOTAL,
                "Total HTTP requests",
                &["method", "path", "status"],
            )?,
            duration: registry.get_or_create_histogram(
                REQUEST_DURATION_SECONDS,
                "HTTP request duration in seconds",
                &["method", "path"],
                buckets,
            )?,
            in_progress: registry.get_or_create_gauge(
                REQUESTS_IN_PROGRESS,
                "HTTP requests currently being handled",
                &["method", "path"],
            )?,
            errors: registry.get_or_create_counter(
                ERRORS_TOTAL,
                "Total HTTP requests that failed with an unhandled error",
                &["error_type", "path"],
            )?,
        })
    }

    /// Callbacks recording into these metrics
    pub fn callbacks(&self) -> RequestMetricsCallbacks {
        let metrics = Arc::new(self.clone());
        let on_start = Arc::clone(&metrics);
        let on_end = Arc::clone(&metrics);
        let on_error = metrics;

        RequestMetricsCallbacks::new()
            .on_start(move |method, path| {
                on_start.request_started(method, path);
            })
            .on_end(move |method, path, status, duration| {
                on_end.request_finished(method, path, status, duration);
            })
            .on_error(move |error_type, path| {
                on_error.request_failed(error_type, path);
            })
    }

    pub fn request_started(&self, method: &str, path: &str) {
        match self.in_progress.with_label_values(&[method, path]) {
            Ok(gauge) => gauge.inc(),
            Err(e) => warn!(error = %e, "Failed to record request start"),
        }
    }

    pub fn request_finished(&self, method: &str, path: &str, status: u16, duration: f64) {
        let status = status.to_string();
        let recorded = self
            .requests
            .with_label_values(&[method, path, &status])
            .map(|counter| counter.inc())
            .and_then(|_| self.duration.with_label_values(&[method, path]))
            .map(|histogram| histogram.observe(duration))
            .and_then(|_| self.in_progress.with_label_values(&[method, path]))
            .map(|gauge| gauge.dec());

        if let Err(e) = recorded {
            warn!(error = %e, "Failed to record request completion");
        }
    }

    pub fn request_failed(&self, error_type: &str, path: &str) {
        match self.errors.with_label_values(&[error_type, path]) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(error = %e, "Failed to record request error"),
        }
    }
}
