//! Configuration management commands.
//!
//! Stores CLI defaults in `~/.cascade/config.toml`. Only known keys are
//! accepted so that a typo does not silently do nothing.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

/// Keys the CLI reads from its config file.
const KNOWN_KEYS: &[&str] = &["api-url", "output"];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (api-url, output)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Remove a configuration value
    Unset {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI configuration stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".cascade").join("config.toml"))
}

fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn check_entry(key: &str, value: Option<&str>) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        anyhow::bail!("Unknown key '{}' (known keys: {})", key, KNOWN_KEYS.join(", "));
    }
    match (key, value) {
        ("api-url", Some(url)) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            anyhow::bail!("api-url must start with http:// or https://")
        }
        ("output", Some(format)) => {
            OutputFormat::from_str(format, true)
                .map_err(|_| anyhow::anyhow!("output must be one of: table, json, yaml"))?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// The `api-url` value from the config file, if set.
pub fn load_api_url() -> Option<String> {
    load_config()
        .ok()
        .and_then(|cfg| cfg.values.get("api-url").cloned())
}

/// The `output` value from the config file, if set and valid.
pub fn load_output_format() -> Option<OutputFormat> {
    load_config()
        .ok()
        .and_then(|cfg| cfg.values.get("output").cloned())
        .and_then(|value| OutputFormat::from_str(&value, true).ok())
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            check_entry(&key, Some(&value))?;
            let mut cfg = load_config()?;
            cfg.values.insert(key.clone(), value.clone());
            save_config(&cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            check_entry(&key, None)?;
            let cfg = load_config()?;
            let value = cfg
                .values
                .get(&key)
                .with_context(|| format!("Key '{}' is not set", key))?;

            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Unset { key } => {
            check_entry(&key, None)?;
            let mut cfg = load_config()?;
            if cfg.values.remove(&key).is_some() {
                save_config(&cfg)?;
                output::print_success(&format!("{} removed", key));
            } else {
                output::print_info(&format!("{} was not set", key));
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;

            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in &cfg.values {
                        output::print_detail(k, v);
                    }
                }
                _ => output::print_item(&cfg.values, format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }

            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}
