//! Request instrumentation middleware
//!
//! [`RequestMetricsLayer`] times every request passing through the wrapped
//! service and reports the outcome to three optional callbacks. It owns no
//! metrics itself: whatever the callbacks write to (a [`MetricRegistry`], a log,
//! a test recorder) is up to the caller.
//!
//! For each request:
//! 1. the start instant is taken, then `on_start(method, path)` runs
//! 2. the inner service handles the request
//! 3. on a response, `on_end(method, path, status, seconds)` runs and the
//!    response is returned unchanged
//! 4. on a fault, `on_end(method, path, 500, seconds)` and then
//!    `on_error(kind, path)` run, and the fault is propagated unchanged
//!
//! Two kinds of fault are observed. An `Err` from the inner service reports the
//! short type name of the error type as its kind and is returned as-is. A panic
//! while handling the request reports `"panic"` and is resumed with its
//! original payload.
//!
//! Services erroring with [`BoxError`] would all report
//! `Box<dyn Error + Send + Sync>`. For those, a classifier set with
//! [`RequestMetricsCallbacks::classify_error`] names the boxed error; when it
//! returns `None` the type name is used.
//!
//! Callbacks run inline on the request task and must not panic; a panicking
//! callback fails the request it runs on. If the request future is dropped
//! before completion (client disconnect, timeout layer), `on_end` does not run.
//!
//! [`MetricRegistry`]: crate::observability::MetricRegistry

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{Request, Response};
use futures::future::BoxFuture;
use futures::FutureExt;
use tower::{BoxError, Layer, Service};

/// Status reported to `on_end` when the request faulted
pub const FAULT_STATUS_CODE: u16 = 500;

/// Fault kind reported to `on_error` when the inner service panicked
pub const PANIC_FAULT_KIND: &str = "panic";

/// Called with `(method, path)` before the request is handled
pub type StartCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Called with `(method, path, status_code, duration_seconds)` once per request
pub type EndCallback = Arc<dyn Fn(&str, &str, u16, f64) + Send + Sync>;

/// Called with `(error_kind, path)` when the request faulted
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Names the error inside a [`BoxError`] for `on_error`
pub type ErrorClassifier = Arc<dyn Fn(&(dyn Error + 'static)) -> Option<String> + Send + Sync>;

/// Optional callbacks invoked over a request's lifecycle
///
/// Every callback is optional; an empty set leaves requests untouched.
#[derive(Clone, Default)]
pub struct RequestMetricsCallbacks {
    on_start: Option<StartCallback>,
    on_end: Option<EndCallback>,
    on_error: Option<ErrorCallback>,
    classify_error: Option<ErrorClassifier>,
}

impl RequestMetricsCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_end<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, u16, f64) + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn classify_error<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> Option<String> + Send + Sync + 'static,
    {
        self.classify_error = Some(Arc::new(classifier));
        self
    }

    fn fault_kind<E: 'static>(&self, err: &E) -> String {
        let boxed = (err as &dyn Any).downcast_ref::<BoxError>();
        if let (Some(classify), Some(boxed)) = (&self.classify_error, boxed) {
            if let Some(kind) = classify(&**boxed) {
                return kind;
            }
        }
        error_kind::<E>()
    }

    fn request_started(&self, method: &str, path: &str) {
        if let Some(on_start) = &self.on_start {
            on_start(method, path);
        }
    }

    fn request_finished(&self, method: &str, path: &str, status: u16, started: Instant) {
        if let Some(on_end) = &self.on_end {
            on_end(method, path, status, started.elapsed().as_secs_f64());
        }
    }

    fn request_failed(&self, kind: &str, path: &str) {
        if let Some(on_error) = &self.on_error {
            on_error(kind, path);
        }
    }
}

impl fmt::Debug for RequestMetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetricsCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("classify_error", &self.classify_error.is_some())
            .finish()
    }
}

/// Layer applying [`RequestMetricsService`] to a service
#[derive(Debug, Clone, Default)]
pub struct RequestMetricsLayer {
    callbacks: RequestMetricsCallbacks,
}

impl RequestMetricsLayer {
    pub fn new(callbacks: RequestMetricsCallbacks) -> Self {
        Self { callbacks }
    }
}

impl<S> Layer<S> for RequestMetricsLayer {
    type Service = RequestMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestMetricsService {
            inner,
            callbacks: self.callbacks.clone(),
        }
    }
}

/// Service timing requests and reporting their outcome to callbacks
#[derive(Debug, Clone)]
pub struct RequestMetricsService<S> {
    inner: S,
    callbacks: RequestMetricsCallbacks,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness, leave a clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let callbacks = self.callbacks.clone();

        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            let started = Instant::now();
            callbacks.request_started(&method, &path);

            let downstream = async move { inner.call(req).await };

            match AssertUnwindSafe(downstream).catch_unwind().await {
                Ok(Ok(response)) => {
                    callbacks.request_finished(&method, &path, response.status().as_u16(), started);
                    Ok(response)
                }
                Ok(Err(err)) => {
                    callbacks.request_finished(&method, &path, FAULT_STATUS_CODE, started);
                    callbacks.request_failed(&callbacks.fault_kind(&err), &path);
                    Err(err)
                }
                Err(panic) => {
                    callbacks.request_finished(&method, &path, FAULT_STATUS_CODE, started);
                    callbacks.request_failed(PANIC_FAULT_KIND, &path);
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

/// Short type name of `E`, module paths stripped
fn error_kind<E>() -> String {
    short_type_name(std::any::type_name::<E>())
}

/// Strip module paths from every path in a type name,
/// e.g. `alloc::boxed::Box<dyn core::error::Error>` becomes `Box<dyn Error>`
fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut path = String::new();

    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
        } else {
            short.push_str(path.rsplit("::").next().unwrap_or_default());
            path.clear();
            short.push(c);
        }
    }
    short.push_str(path.rsplit("::").next().unwrap_or_default());

    short
}
