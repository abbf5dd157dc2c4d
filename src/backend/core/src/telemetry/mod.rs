//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: structured JSON/pretty/compact logging through `tracing`
//! - **Metrics**: Prometheus metrics for cascade activity and HTTP requests
//!
//! # Example
//!
//! ```rust,no_run
//! use cascade_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let handle = init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, CascadeMetrics, MetricsConfig, MetricsRegistry, OperationTimer,
    RequestDurationHistogram,
};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to startup logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "cascade-core".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    std::env::var("CASCADE_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize logging and metrics. Call once at startup.
///
/// # Errors
///
/// Returns an error if either component fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    init_logging(&config.logging, &config.environment)?;
    let metrics = init_metrics(&config.metrics, &config.service_name)?;

    ::tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        metrics_enabled = metrics.is_enabled(),
        "Telemetry initialized"
    );

    Ok(TelemetryHandle { metrics })
}

/// Handle for the telemetry stack installed at startup.
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "cascade-core");
        assert!(!config.service_version.is_empty());
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_telemetry_config_from_json() {
        let config: TelemetryConfig = serde_json::from_value(serde_json::json!({
            "environment": "production",
            "logging": { "level": "warn", "format": "compact" },
            "metrics": { "enabled": false }
        }))
        .unwrap();

        assert_eq!(config.environment, "production");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(!config.metrics.enabled);
    }
}
