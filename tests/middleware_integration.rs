use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    routing::get,
    Router,
};
use tower::{service_fn, ServiceBuilder, ServiceExt};

use pcf_telemetry::middleware::{RequestMetricsCallbacks, RequestMetricsLayer};
use pcf_telemetry::observability::{HttpMetrics, MetricRegistry};

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

fn instrumented_app(registry: &MetricRegistry) -> Router {
    let http_metrics = HttpMetrics::register(registry, None).unwrap();

    Router::new()
        .route(
            "/notes",
            get(|| async { "[]" }).post(|| async { (StatusCode::CREATED, "created") }),
        )
        .route("/teapot", get(|| async { StatusCode::IM_A_TEAPOT }))
        .route("/boom", get(boom))
        .layer(RequestMetricsLayer::new(http_metrics.callbacks()))
}

fn counter(registry: &MetricRegistry, name: &str, labels: &[&str]) -> f64 {
    registry
        .get(name)
        .and_then(|m| m.as_counter().cloned())
        .unwrap()
        .with_label_values(labels)
        .unwrap()
        .get()
}

#[tokio::test]
async fn test_status_codes_recorded() {
    let registry = MetricRegistry::new();
    let app = instrumented_app(&registry);

    let response = app.clone().oneshot(request("GET", "/notes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.clone().oneshot(request("POST", "/notes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app.oneshot(request("GET", "/teapot")).await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/notes", "200"]), 1.0);
    assert_eq!(counter(&registry, "http_requests_total", &["POST", "/notes", "201"]), 1.0);
    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/teapot", "418"]), 1.0);

    let output = registry.render().unwrap();
    assert!(output.contains(r#"http_request_duration_seconds_count{method="POST",path="/notes"} 1"#));
    assert!(output.contains(r#"http_requests_in_progress{method="GET",path="/notes"} 0"#));
    assert!(!output.contains("http_errors_total{"));
}

#[tokio::test]
async fn test_handler_panic_recorded_and_propagated() {
    let registry = Arc::new(MetricRegistry::new());
    let app = instrumented_app(&registry);

    let result = tokio::spawn(app.oneshot(request("GET", "/boom"))).await;

    let err = result.expect_err("panic should propagate through the layer");
    assert!(err.is_panic());

    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/boom", "500"]), 1.0);
    assert_eq!(counter(&registry, "http_errors_total", &["panic", "/boom"]), 1.0);

    let in_progress = registry
        .get("http_requests_in_progress")
        .and_then(|m| m.as_gauge().cloned())
        .unwrap()
        .with_label_values(&["GET", "/boom"])
        .unwrap()
        .get();
    assert_eq!(in_progress, 0.0);
}

#[derive(Debug)]
struct UpstreamTimeout;

impl std::fmt::Display for UpstreamTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("upstream timed out")
    }
}

impl std::error::Error for UpstreamTimeout {}

#[tokio::test]
async fn test_service_error_recorded_and_returned() {
    let registry = MetricRegistry::new();
    let http_metrics = HttpMetrics::register(&registry, None).unwrap();

    let service = ServiceBuilder::new()
        .layer(RequestMetricsLayer::new(http_metrics.callbacks()))
        .service(service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, _>(UpstreamTimeout)
        }));

    let err = service.oneshot(request("DELETE", "/notes/7")).await.unwrap_err();
    assert_eq!(err.to_string(), "upstream timed out");

    assert_eq!(counter(&registry, "http_requests_total", &["DELETE", "/notes/7", "500"]), 1.0);
    assert_eq!(counter(&registry, "http_errors_total", &["UpstreamTimeout", "/notes/7"]), 1.0);
}

#[tokio::test]
async fn test_uninstrumented_layer_is_transparent() {
    let app = Router::new()
        .route("/notes", get(|| async { (StatusCode::ACCEPTED, "queued") }))
        .layer(RequestMetricsLayer::new(RequestMetricsCallbacks::new()));

    let response = app.oneshot(request("GET", "/notes")).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"queued");
}

#[tokio::test]
async fn test_layer_over_plain_tower_service() {
    let registry = MetricRegistry::new();
    let http_metrics = HttpMetrics::register(&registry, None).unwrap();

    let service = ServiceBuilder::new()
        .layer(RequestMetricsLayer::new(http_metrics.callbacks()))
        .service(service_fn(|req: Request<Body>| async move {
            let status = if req.uri().path() == "/missing" {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            Ok::<_, Infallible>(Response::builder().status(status).body(Body::empty()).unwrap())
        }));

    let response = service.clone().oneshot(request("GET", "/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    service.oneshot(request("GET", "/present")).await.unwrap();

    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/missing", "404"]), 1.0);
    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/present", "200"]), 1.0);
}

#[tokio::test]
async fn test_concurrent_requests_share_metrics() {
    let registry = Arc::new(MetricRegistry::new());
    let app = instrumented_app(&registry);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(request("GET", "/notes")).await.unwrap().status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(counter(&registry, "http_requests_total", &["GET", "/notes", "200"]), 50.0);
}
