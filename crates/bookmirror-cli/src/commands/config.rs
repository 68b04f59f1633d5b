//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use bookmirror_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "api_url": config.api_url,
                    "access_token": config.access_token.as_ref().map(|_| "<set>"),
                    "backend": config.backend,
                    "request_timeout_secs": config.request_timeout_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  api_url:              {}",
                config.api_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  access_token:         {}",
                if config.access_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  backend:              {}", config.backend);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    // "none" clears optional values, like an empty string
    let value = if value == "none" { String::new() } else { value };
    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "access_token" && !value.is_empty() {
        "<hidden>"
    } else {
        value.as_str()
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}
