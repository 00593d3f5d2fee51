//! Listener interface for external circuit breakers
//!
//! The breaker itself (thresholds, timeouts, when to open or close) lives
//! outside this crate. A breaker notifies any number of
//! [`CircuitBreakerListener`]s about calls, failures and state transitions;
//! listeners only observe.
//!
//! # Circuit Breaker States
//!
//! 1. **closed**: normal operation, calls pass through
//! 2. **open**: failure mode, calls fail immediately
//! 3. **half_open**: recovery testing, limited calls allowed
//!
//! States are passed to listeners by name so breakers with their own state
//! types can report them without conversion. [`CircuitState`] holds the
//! canonical names and their numeric encoding.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failure mode - calls fail immediately
    Open,
    /// Recovery testing - limited calls allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Value exported by the state gauge: closed 0, open 1, half_open 2
    pub fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown circuit breaker state: {0}")]
pub struct UnknownCircuitState(pub String);

impl FromStr for CircuitState {
    type Err = UnknownCircuitState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            other => Err(UnknownCircuitState(other.to_string())),
        }
    }
}

/// Gauge value for a state name; unrecognized names encode as closed (0)
pub fn state_gauge_value(state: &str) -> f64 {
    state
        .parse::<CircuitState>()
        .map(|state| state.gauge_value())
        .unwrap_or(0.0)
}

/// Notifications a circuit breaker sends to its listeners
///
/// `breaker` is the breaker's own name. Implementations must not panic: they
/// run inline on the breaker's call path.
pub trait CircuitBreakerListener: Send + Sync {
    /// Called before the breaker attempts a call
    fn before_call(&self, _breaker: &str) {}

    /// Called after a successful call
    fn success(&self, _breaker: &str) {}

    /// Called after a failed call with the error that caused it
    fn failure(&self, breaker: &str, error: &(dyn Error + 'static));

    /// Called on every transition; `old_state` is `None` for the initial
    /// state reported when the breaker is created
    fn state_change(&self, breaker: &str, old_state: Option<&str>, new_state: &str);

    /// [`state_change`](Self::state_change) for breakers modelling states as [`CircuitState`]
    fn state_transition(&self, breaker: &str, old_state: Option<CircuitState>, new_state: CircuitState) {
        self.state_change(breaker, old_state.map(|s| s.as_str()), new_state.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_state_names_round_trip() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            assert_eq!(state.as_str().parse::<CircuitState>(), Ok(state));
            assert_eq!(state.to_string(), state.as_str());
        }
    }

    #[test]
    fn test_unknown_state_rejected() {
        let err = "HalfOpen".parse::<CircuitState>().unwrap_err();
        assert_eq!(err, UnknownCircuitState("HalfOpen".to_string()));
        assert_eq!(err.to_string(), "unknown circuit breaker state: HalfOpen");
    }

    #[test]
    fn test_state_gauge_values() {
        assert_eq!(state_gauge_value("closed"), 0.0);
        assert_eq!(state_gauge_value("open"), 1.0);
        assert_eq!(state_gauge_value("half_open"), 2.0);
        assert_eq!(state_gauge_value("forced_open"), 0.0);
        assert_eq!(state_gauge_value(""), 0.0);
    }

    #[derive(Default)]
    struct TransitionLog {
        transitions: Mutex<Vec<(Option<String>, String)>>,
    }

    impl CircuitBreakerListener for TransitionLog {
        fn failure(&self, _breaker: &str, _error: &(dyn Error + 'static)) {}

        fn state_change(&self, _breaker: &str, old_state: Option<&str>, new_state: &str) {
            self.transitions
                .lock()
                .unwrap()
                .push((old_state.map(str::to_string), new_state.to_string()));
        }
    }

    #[test]
    fn test_state_transition_reports_names() {
        let log = TransitionLog::default();

        log.state_transition("db", None, CircuitState::Closed);
        log.state_transition("db", Some(CircuitState::Closed), CircuitState::HalfOpen);

        assert_eq!(
            *log.transitions.lock().unwrap(),
            vec![
                (None, "closed".to_string()),
                (Some("closed".to_string()), "half_open".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let log = TransitionLog::default();
        log.before_call("db");
        log.success("db");
        assert!(log.transitions.lock().unwrap().is_empty());
    }
}
