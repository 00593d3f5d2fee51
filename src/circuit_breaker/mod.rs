//! Circuit breaker observation
//!
//! This crate does not decide when a circuit opens or closes. External
//! breakers report to [`CircuitBreakerListener`]s; [`CircuitBreakerMetrics`]
//! is the listener exporting breaker state and failures as metrics.

pub mod listener;
pub mod metrics;

pub use listener::*;
pub use metrics::CircuitBreakerMetrics;
