//! Sketchroom CLI
//!
//! Command-line and terminal client for Sketchroom - a shared canvas and
//! chat room kept in sync through a relay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sketchroom_core::Config;

mod commands;
mod output;
mod tui;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "sketchroom")]
#[command(about = "Sketchroom - shared canvas and chat")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the terminal client (default)
    Tui {
        /// Display name for this session
        #[arg(short, long)]
        name: Option<String>,
        /// Connect only to this relay endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show the relay rotation order
    Endpoints,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (display_name, endpoints, reconnect.base_delay_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    match cli.command {
        Some(Commands::Config { command }) => handle_config_command(command, config_path, &output),
        Some(Commands::Endpoints) => {
            let config = Config::load_with_cli_override(config_path)
                .context("Failed to load configuration")?;
            commands::endpoints::list(&config, &output)
        }
        Some(Commands::Tui { name, endpoint }) => run_tui(config_path, name, endpoint).await,
        None => run_tui(config_path, None, None).await,
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

async fn run_tui(
    config_path: Option<&PathBuf>,
    name: Option<String>,
    endpoint: Option<String>,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, name, endpoint)?;
    tui::run(config).await
}

/// Flags win over the config file and environment
fn apply_cli_overrides(
    config: &mut Config,
    name: Option<String>,
    endpoint: Option<String>,
) -> Result<()> {
    if let Some(name) = name {
        config
            .set_value("display_name", &name)
            .context("Invalid --name")?;
    }
    if let Some(endpoint) = endpoint {
        config
            .set_value("endpoint_override", &endpoint)
            .context("Invalid --endpoint")?;
    }
    Ok(())
}
