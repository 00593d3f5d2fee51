pub mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MetricKind;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_error_display_messages() {
        let err = TelemetryError::invalid_metric("", "metric name must not be empty");
        assert_eq!(err.to_string(), "Invalid metric '': metric name must not be empty");

        let err = TelemetryError::InvalidIncrement {
            name: "requests_total".to_string(),
            amount: -1.0,
        };
        assert_eq!(err.to_string(), "Counter 'requests_total' cannot be incremented by -1");

        let err = TelemetryError::Config("port out of range".to_string());
        assert_eq!(err.to_string(), "Configuration error: port out of range");
    }

    #[test]
    fn test_conflict_describes_kind_mismatch() {
        let err = TelemetryError::conflict(
            "jobs",
            (MetricKind::Counter, 1),
            (MetricKind::Gauge, 1),
        );
        assert_eq!(
            err.to_string(),
            "Metric 'jobs' is already registered as a counter, cannot register it as a gauge"
        );
    }

    #[test]
    fn test_conflict_describes_label_mismatch() {
        let err = TelemetryError::conflict(
            "jobs",
            (MetricKind::Counter, 1),
            (MetricKind::Counter, 2),
        );
        assert_eq!(
            err.to_string(),
            "Metric 'jobs' is already registered as a counter with 1 labels, cannot register it as a counter with 2 labels"
        );
    }

    #[test]
    fn test_error_to_response_conversion() {
        let err = TelemetryError::Encoding("bad utf-8".to_string());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = TelemetryError::Config("missing".to_string());
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_internal_error_details_hidden() {
        let err = TelemetryError::Internal(anyhow::anyhow!("Connection to 192.168.1.100:9090 failed"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Internal error");
    }
}
