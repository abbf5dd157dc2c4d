//! Prometheus metrics for cascade activity and HTTP requests.
//!
//! This module provides:
//!
//! - Recorder installation with configurable histogram buckets
//! - Request duration histograms for the HTTP surface
//! - Domain counters for roots, inserts, replays, rejections and engagements
//! - An operation timer for snapshot writes
//!
//! # Example
//!
//! ```rust,no_run
//! use cascade_core::telemetry::metrics::{CascadeMetrics, RequestDurationHistogram};
//!
//! RequestDurationHistogram::record("POST", "/api/v1/shares", 201, 0.004);
//! CascadeMetrics::node_inserted(3);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cascade::EngagementAction;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Histogram buckets for node depth
    #[serde(default = "default_depth_buckets")]
    pub depth_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            depth_buckets: default_depth_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
    ]
}

fn default_depth_buckets() -> Vec<f64> {
    vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 15.0, 20.0, 50.0]
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry that renders nothing. Used when metrics are disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if bucket configuration is invalid or a recorder is
/// already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder = builder
        .set_buckets(&config.duration_buckets)?
        .set_buckets_for_metric(
            Matcher::Full("cascade_node_depth".to_string()),
            &config.depth_buckets,
        )?;

    let handle = builder.install_recorder()?;

    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("cascade_roots_created_total", "Share roots created");
    describe_counter!(
        "cascade_nodes_inserted_total",
        "Propagation nodes inserted below a root node"
    );
    describe_counter!(
        "cascade_forward_replays_total",
        "Forward events answered with an existing node"
    );
    describe_counter!(
        "cascade_events_rejected_total",
        "Inbound events rejected, by reason"
    );
    describe_counter!(
        "cascade_engagements_total",
        "Engagement flags set, by action"
    );
    describe_histogram!("cascade_node_depth", "Depth of inserted nodes");
    describe_counter!(
        "cascade_feed_stale_dropped_total",
        "Summary updates not published because a newer one for the root already was"
    );
    describe_counter!(
        "cascade_summary_rebuilds_total",
        "Full summary rebuilds, by whether drift was found"
    );
    describe_histogram!(
        "cascade_snapshot_duration_seconds",
        "Time spent writing a store snapshot"
    );
    describe_counter!("cascade_errors_total", "Errors constructed, by code");
}

/// Request duration histogram for HTTP requests.
pub struct RequestDurationHistogram;

impl RequestDurationHistogram {
    /// Record a request duration.
    pub fn record(method: &str, path: &str, status_code: u16, duration_seconds: f64) {
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .record(duration_seconds);

        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .increment(1);
    }
}

/// Domain metrics for cascade activity.
pub struct CascadeMetrics;

impl CascadeMetrics {
    pub fn root_created() {
        counter!("cascade_roots_created_total").increment(1);
    }

    /// Record a successful insert at `depth`.
    pub fn node_inserted(depth: u32) {
        counter!("cascade_nodes_inserted_total").increment(1);
        histogram!("cascade_node_depth").record(f64::from(depth));
    }

    pub fn forward_replayed() {
        counter!("cascade_forward_replays_total").increment(1);
    }

    pub fn event_rejected(reason: &'static str) {
        counter!("cascade_events_rejected_total", "reason" => reason).increment(1);
    }

    pub fn engagement(action: EngagementAction) {
        counter!("cascade_engagements_total", "action" => action.as_str()).increment(1);
    }

    pub fn feed_update_dropped() {
        counter!("cascade_feed_stale_dropped_total").increment(1);
    }

    pub fn summary_rebuilt(drifted: bool) {
        counter!(
            "cascade_summary_rebuilds_total",
            "drift" => drifted.to_string(),
        )
        .increment(1);
    }
}

/// Utility for tracking operation timing with automatic metric recording.
pub struct OperationTimer {
    start: Instant,
    metric: &'static str,
}

impl OperationTimer {
    /// Start timing an operation recorded into the histogram `metric`.
    pub fn start(metric: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric,
        }
    }

    /// Finish and record to the histogram.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        histogram!(self.metric).record(duration.as_secs_f64());
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
        assert!(config.depth_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = MetricsRegistry::disabled();
        assert!(!registry.is_enabled());
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::start("cascade_snapshot_duration_seconds");
        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();

        assert!(duration.as_millis() >= 10);
    }
}
