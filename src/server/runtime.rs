use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::middleware::RequestMetricsLayer;
use crate::observability::{metrics_endpoint, HttpMetrics, MetricRegistry};

/// Start the Axum HTTP server with the metrics endpoint and graceful shutdown
///
/// Every request, including scrapes of the metrics path, is recorded in the
/// standard HTTP metrics of `registry`. The server binds to the configured
/// address and returns once a SIGINT or SIGTERM has drained open connections.
pub async fn start_server(config: AppConfig, registry: Arc<MetricRegistry>) -> Result<()> {
    info!("Starting metrics server on {}:{}", config.server.bind, config.server.port);

    let http_metrics = HttpMetrics::register(&registry, Some(config.metrics.duration_buckets.as_slice()))?;
    let app = create_router(registry, &http_metrics, &config.metrics.path);
    info!(metrics_path = %config.metrics.path, "Router created successfully");

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}. Is another process using this port?", bind_addr, e))?;
    info!("Server successfully bound to {}", bind_addr);

    serve(listener, app, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve `app` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Create the Axum router with all middleware and routes
///
/// - `/health` liveness check
/// - `metrics_path` Prometheus exposition of `registry`
/// - request metrics and tracing middleware on every route
pub fn create_router(registry: Arc<MetricRegistry>, http_metrics: &HttpMetrics, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_endpoint))
        .route("/health", get(liveness_handler))
        .with_state(registry)
        .layer(RequestMetricsLayer::new(http_metrics.callbacks()))
        .layer(TraceLayer::new_for_http())
}

/// Liveness probe handler at /health
pub async fn liveness_handler() -> &'static str {
    "OK"
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// A signal whose handler cannot be installed is logged and never fires; the
/// other one still triggers shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
