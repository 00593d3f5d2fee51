use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;

use pcf_telemetry::config::{AppConfig, MetricsConfig};
use pcf_telemetry::observability::{HttpMetrics, MetricRegistry};
use pcf_telemetry::server::{create_router, serve, start_server};

struct TestServer {
    port: u16,
    registry: Arc<MetricRegistry>,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

async fn spawn_server(metrics: MetricsConfig) -> Result<TestServer> {
    let registry = Arc::new(MetricRegistry::from_config(&metrics)?);
    let http_metrics = HttpMetrics::register(&registry, Some(metrics.duration_buckets.as_slice()))?;
    let router = create_router(Arc::clone(&registry), &http_metrics, &metrics.path);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, router, async move {
        let _ = rx.await;
    }));

    Ok(TestServer {
        port,
        registry,
        shutdown,
        handle,
    })
}

/// Scrape the metrics path over a real socket
#[tokio::test]
async fn test_metrics_scraped_over_http() -> Result<()> {
    let server = spawn_server(MetricsConfig {
        namespace: Some("pcf".to_string()),
        environment: "test".to_string(),
        ..MetricsConfig::default()
    })
    .await?;

    let client = reqwest::Client::new();

    let health = timeout(
        Duration::from_secs(5),
        client.get(format!("http://127.0.0.1:{}/health", server.port)).send(),
    )
    .await??;
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await?, "OK");

    let scrape = timeout(
        Duration::from_secs(5),
        client.get(format!("http://127.0.0.1:{}/metrics", server.port)).send(),
    )
    .await??;
    assert_eq!(scrape.status(), 200);
    assert_eq!(
        scrape.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let body = scrape.text().await?;
    assert!(body.contains("# TYPE pcf_http_requests_total counter"));
    assert!(body.contains(
        r#"pcf_http_requests_total{method="GET",path="/health",status="200",environment="test"} 1"#
    ));

    drop(client);
    server.shutdown.send(()).ok();
    timeout(Duration::from_secs(5), server.handle).await???;
    Ok(())
}

/// Metrics registered by other components show up in the same scrape
#[tokio::test]
async fn test_shared_registry_exposed() -> Result<()> {
    let server = spawn_server(MetricsConfig {
        path: "/internal/metrics".to_string(),
        environment: String::new(),
        ..MetricsConfig::default()
    })
    .await?;

    server
        .registry
        .get_or_create_gauge("queue_depth", "Queued jobs", &["queue"])?
        .labels(&[("queue", "mail")])?
        .set(12.0);

    let client = reqwest::Client::new();
    let body = timeout(
        Duration::from_secs(5),
        client
            .get(format!("http://127.0.0.1:{}/internal/metrics", server.port))
            .send(),
    )
    .await??
    .text()
    .await?;

    assert!(body.contains(r#"queue_depth{queue="mail"} 12"#));

    let missing = client
        .get(format!("http://127.0.0.1:{}/metrics", server.port))
        .send()
        .await?;
    assert_eq!(missing.status(), 404);

    drop(client);
    server.shutdown.send(()).ok();
    timeout(Duration::from_secs(5), server.handle).await???;
    Ok(())
}

/// Server returns a clear error when the port is already in use
#[tokio::test]
async fn test_port_conflict_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let mut config = AppConfig::default();
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = port;

    let result = timeout(
        Duration::from_secs(2),
        start_server(config, Arc::new(MetricRegistry::new())),
    )
    .await?;

    let err = result.expect_err("binding an occupied port should fail");
    assert!(err.to_string().contains("Failed to bind"));

    drop(listener);
    Ok(())
}
