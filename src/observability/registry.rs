//! Idempotent metric registry
//!
//! [`MetricRegistry`] hands out counters, gauges and histograms by name. The
//! first call for a name creates the metric and registers it for exposition;
//! every later call for the same name returns that same metric, no matter what
//! help text or label names it passes. This makes it safe to define metrics in
//! code that runs more than once per process (re-initialised modules, several
//! adapters sharing one metric, tests).
//!
//! A later call only fails when the request cannot be served by the existing
//! metric: a different kind, a different number of labels, or a name already
//! claimed by a collector registered directly on the backing
//! `prometheus::Registry`.
//!
//! # Lifecycle
//!
//! [`MetricRegistry::global`] is created lazily on first use and lives for the
//! rest of the process. Components take a `&MetricRegistry`, so tests build a
//! fresh registry each instead of sharing the global one.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use prometheus::{Registry, TextEncoder};
use prometheus::proto::MetricFamily;
use tracing::{debug, warn};

use super::metrics::{Counter, Gauge, Histogram, MetricKind, RegisteredMetric};
use crate::config::MetricsConfig;
use crate::error::{Result, TelemetryError};

/// Process-wide registry (initialized lazily, never torn down)
static GLOBAL_REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();

/// Create-or-fetch registry of named metrics
pub struct MetricRegistry {
    registry: Registry,
    metrics: RwLock<HashMap<String, RegisteredMetric>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Registry whose exposition carries the configured namespace prefix and
    /// an `environment` constant label
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        let prefix = config.namespace.clone().filter(|ns| !ns.is_empty());
        let const_labels = (!config.environment.is_empty()).then(|| {
            HashMap::from([("environment".to_string(), config.environment.clone())])
        });

        let registry = Registry::new_custom(prefix, const_labels)
            .map_err(|e| TelemetryError::Config(format!("invalid metrics registry settings: {}", e)))?;

        Ok(Self::with_registry(registry))
    }

    /// Wrap an existing `prometheus::Registry`
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static MetricRegistry {
        GLOBAL_REGISTRY.get_or_init(MetricRegistry::new)
    }

    pub fn get_or_create_counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Counter> {
        let metric = self.get_or_create(name, MetricKind::Counter, label_names.len(), || {
            Counter::build(name, help, label_names).map(RegisteredMetric::Counter)
        })?;

        match metric {
            RegisteredMetric::Counter(counter) => Ok(counter),
            other => Err(mismatch(name, &other, MetricKind::Counter, label_names.len())),
        }
    }

    pub fn get_or_create_gauge(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Gauge> {
        let metric = self.get_or_create(name, MetricKind::Gauge, label_names.len(), || {
            Gauge::build(name, help, label_names).map(RegisteredMetric::Gauge)
        })?;

        match metric {
            RegisteredMetric::Gauge(gauge) => Ok(gauge),
            other => Err(mismatch(name, &other, MetricKind::Gauge, label_names.len())),
        }
    }

    /// `buckets` defaults to the Prometheus default buckets; it is ignored
    /// when the histogram already exists
    pub fn get_or_create_histogram(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: Option<&[f64]>,
    ) -> Result<Histogram> {
        let metric = self.get_or_create(name, MetricKind::Histogram, label_names.len(), || {
            Histogram::build(name, help, label_names, buckets).map(RegisteredMetric::Histogram)
        })?;

        match metric {
            RegisteredMetric::Histogram(histogram) => Ok(histogram),
            other => Err(mismatch(name, &other, MetricKind::Histogram, label_names.len())),
        }
    }

    /// Look up a registered metric by name
    pub fn get(&self, name: &str) -> Option<RegisteredMetric> {
        self.read_index().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_index().contains_key(name)
    }

    /// Names of all registered metrics, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_index().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_index().is_empty()
    }

    /// The backing `prometheus::Registry`, for collectors managed elsewhere
    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.gather())
            .map_err(|e| TelemetryError::Encoding(e.to_string()))
    }

    fn get_or_create(
        &self,
        name: &str,
        kind: MetricKind,
        label_count: usize,
        build: impl FnOnce() -> Result<RegisteredMetric>,
    ) -> Result<RegisteredMetric> {
        if let Some(existing) = self.read_index().get(name) {
            return reuse(name, existing, kind, label_count);
        }

        let mut index = self.write_index();

        // Another caller may have created it between the two locks
        if let Some(existing) = index.get(name) {
            return reuse(name, existing, kind, label_count);
        }

        let metric = build()?;
        if let Err(e) = self.registry.register(metric.collector()) {
            warn!(
                metric = %name,
                kind = %kind,
                error = %e,
                "Metric registration rejected by the exposition registry"
            );
            return Err(match e {
                prometheus::Error::AlreadyReg => TelemetryError::RegistrationConflict {
                    name: name.to_string(),
                    existing: "collector registered outside the metric registry".to_string(),
                    requested: kind.to_string(),
                },
                other => TelemetryError::invalid_metric(name, other.to_string()),
            });
        }

        debug!(
            metric = %name,
            kind = %kind,
            labels = %label_count,
            "Metric registered"
        );

        index.insert(name.to_string(), metric.clone());
        Ok(metric)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, RegisteredMetric>> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, RegisteredMetric>> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish()
    }
}

fn reuse(
    name: &str,
    existing: &RegisteredMetric,
    kind: MetricKind,
    label_count: usize,
) -> Result<RegisteredMetric> {
    if existing.kind() != kind || existing.label_names().len() != label_count {
        let err = mismatch(name, existing, kind, label_count);
        warn!(metric = %name, error = %err, "Metric registration conflict");
        return Err(err);
    }
    Ok(existing.clone())
}

fn mismatch(
    name: &str,
    existing: &RegisteredMetric,
    kind: MetricKind,
    label_count: usize,
) -> TelemetryError {
    TelemetryError::conflict(
        name,
        (existing.kind(), existing.label_names().len()),
        (kind, label_count),
    )
}
