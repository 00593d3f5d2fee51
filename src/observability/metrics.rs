//! Metric handles backed by the `prometheus` crate
//!
//! Each handle owns a labelled metric vector plus the descriptor it was
//! created with:
//! - [`Counter`] for monotonic totals (requests, failures, transitions)
//! - [`Gauge`] for values that move both ways (in-flight requests, breaker state)
//! - [`Histogram`] for bucketed observations (request durations)
//!
//! Handles are cheap to clone. Every clone of a handle, and every handle
//! returned by the registry for the same name, shares the same accumulators.
//!
//! # Labels
//!
//! Child series are selected either by `(key, value)` pairs in any order via
//! `labels()`, or positionally via `with_label_values()` in the order the label
//! names were declared. Both fail with [`TelemetryError::LabelMismatch`] when
//! the keys or arity disagree with the metric's label names.
//!
//! # Concurrency
//!
//! Accumulation (`inc`, `set`, `observe`) is a single atomic operation on the
//! child series, safe from any number of tasks.

use std::fmt;
use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts};

use crate::error::{Result, TelemetryError};

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name, help and label names, fixed when the metric is first created
#[derive(Debug)]
struct MetricDesc {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDesc {
    fn new(name: &str, help: &str, label_names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        })
    }

    /// Order `(key, value)` pairs by the declared label names
    fn ordered_values<'v>(&self, labels: &[(&str, &'v str)]) -> Result<Vec<&'v str>> {
        if labels.len() != self.label_names.len() {
            return Err(TelemetryError::label_mismatch(
                &self.name,
                format!("expected {} labels, got {}", self.label_names.len(), labels.len()),
            ));
        }

        self.label_names
            .iter()
            .map(|label| {
                labels
                    .iter()
                    .find(|(key, _)| *key == label.as_str())
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        TelemetryError::label_mismatch(&self.name, format!("missing label '{}'", label))
                    })
            })
            .collect()
    }

    fn check_arity(&self, values: &[&str]) -> Result<()> {
        if values.len() != self.label_names.len() {
            return Err(TelemetryError::label_mismatch(
                &self.name,
                format!("expected {} label values, got {}", self.label_names.len(), values.len()),
            ));
        }
        Ok(())
    }
}

fn backend_error(name: &str, err: prometheus::Error) -> TelemetryError {
    TelemetryError::invalid_metric(name, err.to_string())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TelemetryError::invalid_metric(name, "metric name must not be empty"));
    }
    Ok(())
}

/// Bucket boundaries must be non-empty, finite and strictly ascending
pub fn validate_buckets(name: &str, buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(TelemetryError::invalid_metric(name, "histogram buckets must not be empty"));
    }
    if buckets.iter().any(|b| b.is_nan()) {
        return Err(TelemetryError::invalid_metric(name, "histogram buckets must be numbers"));
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(TelemetryError::invalid_metric(
            name,
            "histogram buckets must be in strictly ascending order",
        ));
    }
    Ok(())
}

/// Monotonically increasing metric
#[derive(Clone)]
pub struct Counter {
    desc: Arc<MetricDesc>,
    vec: CounterVec,
}

impl Counter {
    pub(crate) fn build(name: &str, help: &str, label_names: &[&str]) -> Result<Self> {
        validate_name(name)?;
        let vec = CounterVec::new(Opts::new(name, help), label_names)
            .map_err(|e| backend_error(name, e))?;

        Ok(Self {
            desc: MetricDesc::new(name, help, label_names),
            vec,
        })
    }

    /// Child series for the given `(label, value)` pairs
    pub fn labels(&self, labels: &[(&str, &str)]) -> Result<CounterSeries> {
        let values = self.desc.ordered_values(labels)?;
        self.with_label_values(&values)
    }

    /// Child series for label values given in declaration order
    pub fn with_label_values(&self, values: &[&str]) -> Result<CounterSeries> {
        self.desc.check_arity(values)?;
        let inner = self
            .vec
            .get_metric_with_label_values(values)
            .map_err(|e| TelemetryError::label_mismatch(&self.desc.name, e.to_string()))?;

        Ok(CounterSeries {
            desc: Arc::clone(&self.desc),
            inner,
        })
    }

    pub(crate) fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}

/// One labelled child series of a [`Counter`]
#[derive(Clone)]
pub struct CounterSeries {
    desc: Arc<MetricDesc>,
    inner: prometheus::Counter,
}

impl CounterSeries {
    pub fn inc(&self) {
        self.inner.inc();
    }

    /// Increment by `amount`; negative and non-finite amounts are rejected
    pub fn inc_by(&self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(TelemetryError::InvalidIncrement {
                name: self.desc.name.clone(),
                amount,
            });
        }
        self.inner.inc_by(amount);
        Ok(())
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

/// Metric that can be set, incremented or decremented arbitrarily
#[derive(Clone)]
pub struct Gauge {
    desc: Arc<MetricDesc>,
    vec: GaugeVec,
}

impl Gauge {
    pub(crate) fn build(name: &str, help: &str, label_names: &[&str]) -> Result<Self> {
        validate_name(name)?;
        let vec = GaugeVec::new(Opts::new(name, help), label_names)
            .map_err(|e| backend_error(name, e))?;

        Ok(Self {
            desc: MetricDesc::new(name, help, label_names),
            vec,
        })
    }

    /// Child series for the given `(label, value)` pairs
    pub fn labels(&self, labels: &[(&str, &str)]) -> Result<GaugeSeries> {
        let values = self.desc.ordered_values(labels)?;
        self.with_label_values(&values)
    }

    /// Child series for label values given in declaration order
    pub fn with_label_values(&self, values: &[&str]) -> Result<GaugeSeries> {
        self.desc.check_arity(values)?;
        let inner = self
            .vec
            .get_metric_with_label_values(values)
            .map_err(|e| TelemetryError::label_mismatch(&self.desc.name, e.to_string()))?;

        Ok(GaugeSeries { inner })
    }

    pub(crate) fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}

/// One labelled child series of a [`Gauge`]
#[derive(Clone)]
pub struct GaugeSeries {
    inner: prometheus::Gauge,
}

impl GaugeSeries {
    pub fn set(&self, value: f64) {
        self.inner.set(value);
    }

    pub fn inc(&self) {
        self.inner.inc();
    }

    pub fn dec(&self) {
        self.inner.dec();
    }

    pub fn add(&self, value: f64) {
        self.inner.add(value);
    }

    pub fn sub(&self, value: f64) {
        self.inner.sub(value);
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

/// Bucketed observations plus a running sum
#[derive(Clone)]
pub struct Histogram {
    desc: Arc<MetricDesc>,
    vec: HistogramVec,
    buckets: Arc<[f64]>,
}

impl Histogram {
    pub(crate) fn build(
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: Option<&[f64]>,
    ) -> Result<Self> {
        validate_name(name)?;
        let buckets = match buckets {
            Some(buckets) => {
                validate_buckets(name, buckets)?;
                buckets.to_vec()
            }
            None => prometheus::DEFAULT_BUCKETS.to_vec(),
        };

        let opts = HistogramOpts::new(name, help).buckets(buckets.clone());
        let vec = HistogramVec::new(opts, label_names).map_err(|e| backend_error(name, e))?;

        Ok(Self {
            desc: MetricDesc::new(name, help, label_names),
            vec,
            buckets: buckets.into(),
        })
    }

    /// Upper bounds of the buckets fixed at creation
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Child series for the given `(label, value)` pairs
    pub fn labels(&self, labels: &[(&str, &str)]) -> Result<HistogramSeries> {
        let values = self.desc.ordered_values(labels)?;
        self.with_label_values(&values)
    }

    /// Child series for label values given in declaration order
    pub fn with_label_values(&self, values: &[&str]) -> Result<HistogramSeries> {
        self.desc.check_arity(values)?;
        let inner = self
            .vec
            .get_metric_with_label_values(values)
            .map_err(|e| TelemetryError::label_mismatch(&self.desc.name, e.to_string()))?;

        Ok(HistogramSeries { inner })
    }

    pub(crate) fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}

/// One labelled child series of a [`Histogram`]
#[derive(Clone)]
pub struct HistogramSeries {
    inner: prometheus::Histogram,
}

impl HistogramSeries {
    pub fn observe(&self, value: f64) {
        self.inner.observe(value);
    }

    pub fn sample_count(&self) -> u64 {
        self.inner.get_sample_count()
    }

    pub fn sample_sum(&self) -> f64 {
        self.inner.get_sample_sum()
    }
}

impl fmt::Debug for CounterSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterSeries")
            .field("name", &self.desc.name)
            .field("value", &self.get())
            .finish()
    }
}

impl fmt::Debug for GaugeSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeSeries")
            .field("value", &self.get())
            .finish()
    }
}

impl fmt::Debug for HistogramSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramSeries")
            .field("sample_count", &self.sample_count())
            .field("sample_sum", &self.sample_sum())
            .finish()
    }
}

macro_rules! impl_metric_descriptor {
    ($($handle:ident => $kind:expr),+ $(,)?) => {
        $(
            impl $handle {
                pub fn name(&self) -> &str {
                    &self.desc.name
                }

                pub fn help(&self) -> &str {
                    &self.desc.help
                }

                pub fn label_names(&self) -> &[String] {
                    &self.desc.label_names
                }

                pub fn kind(&self) -> MetricKind {
                    $kind
                }

                /// Whether both handles refer to the same registered metric
                pub fn same_metric(&self, other: &Self) -> bool {
                    Arc::ptr_eq(&self.desc, &other.desc)
                }
            }

            impl fmt::Debug for $handle {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($handle))
                        .field("name", &self.desc.name)
                        .field("label_names", &self.desc.label_names)
                        .finish()
                }
            }
        )+
    };
}

impl_metric_descriptor! {
    Counter => MetricKind::Counter,
    Gauge => MetricKind::Gauge,
    Histogram => MetricKind::Histogram,
}

/// A metric as stored in the registry index
#[derive(Debug, Clone)]
pub enum RegisteredMetric {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

impl RegisteredMetric {
    pub fn kind(&self) -> MetricKind {
        match self {
            RegisteredMetric::Counter(_) => MetricKind::Counter,
            RegisteredMetric::Gauge(_) => MetricKind::Gauge,
            RegisteredMetric::Histogram(_) => MetricKind::Histogram,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegisteredMetric::Counter(m) => m.name(),
            RegisteredMetric::Gauge(m) => m.name(),
            RegisteredMetric::Histogram(m) => m.name(),
        }
    }

    pub fn help(&self) -> &str {
        match self {
            RegisteredMetric::Counter(m) => m.help(),
            RegisteredMetric::Gauge(m) => m.help(),
            RegisteredMetric::Histogram(m) => m.help(),
        }
    }

    pub fn label_names(&self) -> &[String] {
        match self {
            RegisteredMetric::Counter(m) => m.label_names(),
            RegisteredMetric::Gauge(m) => m.label_names(),
            RegisteredMetric::Histogram(m) => m.label_names(),
        }
    }

    pub fn as_counter(&self) -> Option<&Counter> {
        match self {
            RegisteredMetric::Counter(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Gauge> {
        match self {
            RegisteredMetric::Gauge(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Histogram> {
        match self {
            RegisteredMetric::Histogram(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn collector(&self) -> Box<dyn Collector> {
        match self {
            RegisteredMetric::Counter(m) => m.collector(),
            RegisteredMetric::Gauge(m) => m.collector(),
            RegisteredMetric::Histogram(m) => m.collector(),
        }
    }
}
