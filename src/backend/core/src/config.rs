//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CascadeError, Result};
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Store persistence configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Summary feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Logging and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file; persistence is off when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// How often the snapshot is rewritten
    #[serde(default = "default_snapshot_interval", with = "humantime_serde")]
    pub snapshot_interval: Duration,

    /// Load the snapshot file at startup if it exists
    #[serde(default = "default_restore_on_start")]
    pub restore_on_start: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval: default_snapshot_interval(),
            restore_on_start: default_restore_on_start(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Summary updates buffered per subscriber before it starts lagging
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_snapshot_interval() -> Duration { Duration::from_secs(30) }
fn default_restore_on_start() -> bool { true }
fn default_feed_capacity() -> usize { 1024 }

impl Config {
    /// Load configuration from `CASCADE__`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CASCADE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CASCADE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.feed.capacity == 0 {
            return Err(CascadeError::configuration(
                "feed.capacity must be greater than zero",
            ));
        }
        if self.store.snapshot_interval.is_zero() {
            return Err(CascadeError::configuration(
                "store.snapshot_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert!(config.store.snapshot_path.is_none());
        assert_eq!(config.store.snapshot_interval, Duration::from_secs(30));
        assert_eq!(config.feed.capacity, 1024);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "server": {{ "port": 9100 }},
                "store": {{ "snapshot_path": "/var/lib/cascade/snapshot.json", "snapshot_interval": "5m" }},
                "feed": {{ "capacity": 16 }}
            }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.store.snapshot_interval, Duration::from_secs(300));
        assert_eq!(
            config.store.snapshot_path,
            Some(PathBuf::from("/var/lib/cascade/snapshot.json"))
        );
        assert_eq!(config.feed.capacity, 16);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "feed": {{ "capacity": 0 }} }}"#).unwrap();

        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        let err = err.downcast_ref::<CascadeError>().unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
        assert!(err.user_message().contains("feed.capacity"));
    }

    #[test]
    fn test_zero_snapshot_interval_is_rejected() {
        let config = Config {
            store: StoreConfig {
                snapshot_interval: Duration::ZERO,
                ..StoreConfig::default()
            },
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }
}
