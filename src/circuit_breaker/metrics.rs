//! Prometheus metrics for circuit breakers
//!
//! [`CircuitBreakerMetrics`] is a [`CircuitBreakerListener`] that turns breaker
//! notifications into three metrics, all labelled by `service`:
//!
//! - `circuit_breaker_state` gauge: 0 closed, 1 open, 2 half_open
//! - `circuit_breaker_state_changes_total` counter, also labelled by
//!   `from_state` and `to_state` (`from_state="unknown"` for the initial state)
//! - `circuit_breaker_failures_total` counter
//!
//! The metrics are registered idempotently, so one listener per protected
//! service can be created against the same registry:
//!
//! ```rust,ignore
//! let registry = MetricRegistry::global();
//! let redis = CircuitBreakerMetrics::new(registry, "redis")?;
//! let keycloak = CircuitBreakerMetrics::new(registry, "keycloak")?;
//! ```

use std::error::Error;

use tracing::{error, warn};

use super::listener::{state_gauge_value, CircuitBreakerListener};
use crate::error::Result;
use crate::observability::{Counter, Gauge, MetricRegistry};

pub const STATE_METRIC: &str = "circuit_breaker_state";
pub const STATE_CHANGES_METRIC: &str = "circuit_breaker_state_changes_total";
pub const FAILURES_METRIC: &str = "circuit_breaker_failures_total";

/// `from_state` reported for the first transition of a breaker
pub const UNKNOWN_STATE: &str = "unknown";

/// Circuit breaker listener recording state and failures for one service
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    service_name: String,
    state: Gauge,
    state_changes: Counter,
    failures: Counter,
}

impl CircuitBreakerMetrics {
    /// Register (or reuse) the circuit breaker metrics in `registry`
    pub fn new(registry: &MetricRegistry, service_name: impl Into<String>) -> Result<Self> {
        let state = registry.get_or_create_gauge(
            STATE_METRIC,
            "Current circuit breaker state (0=closed, 1=open, 2=half_open)",
            &["service"],
        )?;
        let state_changes = registry.get_or_create_counter(
            STATE_CHANGES_METRIC,
            "Total circuit breaker state changes",
            &["service", "from_state", "to_state"],
        )?;
        let failures = registry.get_or_create_counter(
            FAILURES_METRIC,
            "Total circuit breaker failures",
            &["service"],
        )?;

        Ok(Self {
            service_name: service_name.into(),
            state,
            state_changes,
            failures,
        })
    }

    /// Listener backed by the process-wide registry
    pub fn global(service_name: impl Into<String>) -> Result<Self> {
        Self::new(MetricRegistry::global(), service_name)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn record_failure(&self) -> Result<()> {
        self.failures
            .with_label_values(&[self.service_name.as_str()])?
            .inc();
        Ok(())
    }

    fn record_state_change(&self, from_state: &str, to_state: &str) -> Result<()> {
        self.state
            .with_label_values(&[self.service_name.as_str()])?
            .set(state_gauge_value(to_state));
        self.state_changes
            .with_label_values(&[self.service_name.as_str(), from_state, to_state])?
            .inc();
        Ok(())
    }
}

impl CircuitBreakerListener for CircuitBreakerMetrics {
    fn failure(&self, _breaker: &str, err: &(dyn Error + 'static)) {
        error!(
            service = %self.service_name,
            error = %err,
            "{} circuit breaker failure: {}",
            capitalize(&self.service_name),
            err
        );

        if let Err(e) = self.record_failure() {
            warn!(service = %self.service_name, error = %e, "Failed to record circuit breaker failure");
        }
    }

    fn state_change(&self, _breaker: &str, old_state: Option<&str>, new_state: &str) {
        let from_state = old_state.unwrap_or(UNKNOWN_STATE);

        warn!(
            service = %self.service_name,
            from_state = %from_state,
            to_state = %new_state,
            "{} circuit breaker state changed: {} → {}",
            capitalize(&self.service_name),
            from_state,
            new_state
        );

        if let Err(e) = self.record_state_change(from_state, new_state) {
            warn!(service = %self.service_name, error = %e, "Failed to record circuit breaker state change");
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
