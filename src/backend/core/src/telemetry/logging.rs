//! Structured logging for the cascade server.
//!
//! Output goes through one `fmt` layer whose shape (json, pretty, compact)
//! is picked at startup. The filter starts from the global level, then
//! applies the built-in cascade module levels, then the configured overrides.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Module levels applied unless overridden in `module_levels`.
///
/// Inserts and rebuilds log at `info` in the store; the feed traces every
/// publish, which is too chatty to leave on by default.
const CASCADE_MODULE_LEVELS: &[(&str, &str)] = &[
    ("cascade_core::store", "info"),
    ("cascade_core::builder", "info"),
    ("cascade_core::feed", "warn"),
    ("tower_http", "info"),
];

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module levels, on top of the built-in cascade defaults
    #[serde(default)]
    pub module_levels: BTreeMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_include_location")]
    pub include_location: bool,

    #[serde(default)]
    pub include_thread: bool,

    /// Log a line when an instrumented store or builder span closes
    #[serde(default)]
    pub span_close_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: BTreeMap::new(),
            include_location: default_include_location(),
            include_thread: false,
            span_close_events: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines for log shippers
    #[default]
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// `development` swaps the JSON default for pretty output.
    fn for_environment(self, environment: &str) -> Self {
        match self {
            LogFormat::Json if environment == "development" => LogFormat::Pretty,
            format => format,
        }
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

/// Effective per-module directives: built-in cascade levels, then overrides.
fn module_directives(config: &LoggingConfig) -> BTreeMap<String, String> {
    let mut levels: BTreeMap<String, String> = CASCADE_MODULE_LEVELS
        .iter()
        .map(|(module, level)| (module.to_string(), level.to_string()))
        .collect();
    levels.extend(config.module_levels.clone());
    levels
}

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in module_directives(config) {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

fn build_fmt_layer(config: &LoggingConfig, format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread)
        .with_target(true);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let filter = build_filter(config)?;
    let format = config.format.for_environment(environment);

    tracing_subscriber::registry()
        .with(build_fmt_layer(config, format))
        .with(filter)
        .try_init()?;

    Ok(())
}
