use thiserror::Error;
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;

use crate::observability::metrics::MetricKind;

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metric '{name}' is already registered as a {existing}, cannot register it as a {requested}")]
    RegistrationConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Invalid metric '{name}': {reason}")]
    InvalidMetric { name: String, reason: String },

    #[error("Label mismatch for metric '{name}': {reason}")]
    LabelMismatch { name: String, reason: String },

    #[error("Counter '{name}' cannot be incremented by {amount}")]
    InvalidIncrement { name: String, amount: f64 },

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl TelemetryError {
    /// Conflict between an already registered metric and a new request for the same name.
    ///
    /// `existing` and `requested` describe shape as `<kind>` or `<kind> with N labels`.
    pub fn conflict(
        name: &str,
        existing: (MetricKind, usize),
        requested: (MetricKind, usize),
    ) -> Self {
        let describe = |(kind, labels): (MetricKind, usize)| {
            if existing.0 == requested.0 {
                format!("{} with {} labels", kind, labels)
            } else {
                kind.to_string()
            }
        };

        TelemetryError::RegistrationConflict {
            name: name.to_string(),
            existing: describe(existing),
            requested: describe(requested),
        }
    }

    pub fn invalid_metric(name: &str, reason: impl Into<String>) -> Self {
        TelemetryError::InvalidMetric {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn label_mismatch(name: &str, reason: impl Into<String>) -> Self {
        TelemetryError::LabelMismatch {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        let status = match &self {
            TelemetryError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details
        let body = match &self {
            TelemetryError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}
