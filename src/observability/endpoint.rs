//! Metrics endpoint
//!
//! Serves everything registered in a [`MetricRegistry`] in the Prometheus text
//! exposition format.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use super::registry::MetricRegistry;
use crate::error::TelemetryError;

/// Content type of the Prometheus text format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Metrics endpoint handler
pub async fn metrics_endpoint(
    State(registry): State<Arc<MetricRegistry>>,
) -> Result<Response, TelemetryError> {
    let metrics_content = registry.render()?;

    tracing::debug!(
        metrics_size = %metrics_content.len(),
        "Metrics served successfully"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        metrics_content,
    )
        .into_response())
}
