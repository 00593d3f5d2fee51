//! Request and circuit breaker metrics for axum services
//!
//! - [`observability::MetricRegistry`]: create-or-fetch registry of Prometheus
//!   counters, gauges and histograms
//! - [`middleware::RequestMetricsLayer`]: tower layer reporting request
//!   start, completion and faults to optional callbacks
//! - [`circuit_breaker::CircuitBreakerMetrics`]: listener exporting the state
//!   and failures of external circuit breakers

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::*;
pub use error::*;
pub use server::*;

use std::sync::Arc;

use crate::observability::MetricRegistry;

/// Main server entry point for library usage
pub async fn run_server(cli: &Cli) -> anyhow::Result<()> {
    let app_config = config::load_config(cli)?;

    observability::init_logging(&app_config.logging)?;
    ::tracing::info!("Metrics server starting up");

    let registry = Arc::new(MetricRegistry::from_config(&app_config.metrics)?);

    server::start_server(app_config, registry).await
}
