use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct AppConfig {
    #[garde(dive)]
    #[serde(default)]
    pub server: ServerConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[garde(range(min = 1024, max = 65535))]
    pub port: u16,

    #[garde(length(min = 1), custom(validate_bind_address))]
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String,  // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MetricsConfig {
    /// Route serving the Prometheus text exposition
    #[garde(length(min = 1), custom(validate_route_path))]
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Prefix prepended to every exposed metric name
    #[garde(skip)]
    #[serde(default)]
    pub namespace: Option<String>,

    /// Value of the `environment` constant label; empty disables the label
    #[garde(skip)]
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Buckets of `http_request_duration_seconds`
    #[garde(custom(validate_duration_buckets))]
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            namespace: None,
            environment: default_environment(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn validate_bind_address(value: &str, _: &()) -> garde::Result {
    value.parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid IP address"))
}

fn validate_route_path(value: &str, _: &()) -> garde::Result {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(garde::Error::new("Route path must start with '/'"))
    }
}

fn validate_duration_buckets(value: &[f64], _: &()) -> garde::Result {
    crate::observability::metrics::validate_buckets("http_request_duration_seconds", value)
        .map_err(|e| garde::Error::new(e.to_string()))
}
