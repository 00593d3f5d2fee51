//! Observability module for metrics and logging
//!
//! - [`registry`]: idempotent registry of counters, gauges and histograms
//! - [`metrics`]: metric handles and their labelled series
//! - [`http`]: standard HTTP request metrics fed by the request middleware
//! - [`endpoint`]: Prometheus text exposition over HTTP
//! - [`init`]: tracing subscriber setup

pub mod endpoint;
pub mod http;
pub mod init;
pub mod metrics;
pub mod registry;

pub use endpoint::*;
pub use http::HttpMetrics;
pub use init::*;
pub use metrics::*;
pub use registry::*;
