//! Cascade CLI - Command-line interface for a cascade tracking server.
//!
//! Posts share, forward and engagement events and renders cascades,
//! summaries, frontiers and paths.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, event, health, tree};
use output::OutputFormat;

/// Cascade - share cascade tracking CLI
#[derive(Parser)]
#[command(
    name = "cascade",
    version,
    about = "Cascade - share cascade tracking",
    long_about = "CLI tool for feeding share events to a cascade server and inspecting how content spread.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format [default: table, or `output` from the config file]
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// API server URL
    #[arg(long, global = true, env = "CASCADE_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Event(event::EventCommands),

    #[command(flatten)]
    Tree(tree::TreeCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli
        .output
        .or_else(config::load_output_format)
        .unwrap_or_default();

    let result = match cli.command {
        Commands::Event(cmd) => event::execute(cmd, &client, format).await,
        Commands::Tree(cmd) => tree::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_forward_arguments() {
        let root = uuid::Uuid::new_v4();
        let via = uuid::Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "cascade",
            "--output",
            "json",
            "forward",
            &root.to_string(),
            "bob",
            "--via",
            &via.to_string(),
        ])
        .unwrap();

        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Event(event::EventCommands::Forward { root_id, user, via: v }) => {
                assert_eq!(root_id, root);
                assert_eq!(user, "bob");
                assert_eq!(v, via);
            }
            _ => panic!("expected forward"),
        }
    }
}
