//! Health check command.
//!
//! Queries the `/health` endpoint and reports server status, how many
//! cascades are tracked and how many summary stream subscribers are attached.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Exit with an error when the server is not healthy
    #[arg(long)]
    strict: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    match format {
        OutputFormat::Table => {
            output::print_header("Server Health");
            output::print_detail("Status", &status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }
            if let Some(cascades) = health.get("cascades").and_then(|v| v.as_u64()) {
                output::print_detail("Cascades", &cascades.to_string());
            }
            if let Some(subscribers) = health.get("feed_subscribers").and_then(|v| v.as_u64()) {
                output::print_detail("Stream subscribers", &subscribers.to_string());
            }
            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if status == "healthy" {
                output::print_success("Cascade server operational");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    if args.strict && status != "healthy" {
        anyhow::bail!("server reported status '{}'", status);
    }
    Ok(())
}
