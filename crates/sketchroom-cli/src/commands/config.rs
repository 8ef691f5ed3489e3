//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use sketchroom_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.display_name);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let endpoints: Vec<String> = config.endpoints.iter().map(ToString::to_string).collect();

            println!("Configuration:");
            println!("  display_name:         {}", config.display_name);
            println!("  endpoints:            {}", endpoints.join(", "));
            println!(
                "  endpoint_override:    {}",
                config
                    .endpoint_override
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  announce_join:        {}", config.announce_join);
            println!("  connect_timeout_secs: {}", config.connect_timeout_secs);
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  log_file:             {}", config.log_path().display());
            println!();
            println!("Reconnect:");
            println!("  base_delay_ms:        {}", config.reconnect.base_delay_ms);
            println!("  growth_factor:        {}", config.reconnect.growth_factor);
            println!("  max_delay_ms:         {}", config.reconnect.max_delay_ms);
            println!("  max_jitter_ms:        {}", config.reconnect.max_jitter_ms);
            println!("  attempt_cap:          {}", config.reconnect.attempt_cap);
            println!();
            println!("Heartbeat:");
            println!("  interval_secs:        {}", config.heartbeat.interval_secs);
            println!("  timeout_secs:         {}", config.heartbeat.timeout_secs);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set_value(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
