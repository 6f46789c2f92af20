//! Apple SPI keyboard/touchpad driver CLI
//!
//! Decodes packets, replays traces and drives the simulated device.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use applespi::DriverConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands, ConfigCommands};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let config = apply_overrides(DriverConfig::load(&config_path)?, &cli)?;

    match cli.command {
        Commands::Decode { packets } => commands::decode::run(&packets, cli.json),
        Commands::Replay { file, stats } => {
            commands::replay::run(&config, &file, stats, cli.json)
        }
        Commands::Simulate {
            text,
            backlight,
            suspend,
        } => commands::simulate::run(&config, &text, backlight, suspend, cli.json).await,
        Commands::Capabilities => commands::info::capabilities(&config, cli.json),
        Commands::Config(ConfigCommands::Show) => commands::config::show(&config),
        Commands::Config(ConfigCommands::Path) => commands::config::path(&config_path),
        Commands::Config(ConfigCommands::Save) => commands::config::save(&config, &config_path),
    }
}

/// Command-line flags take precedence over the config file
fn apply_overrides(mut config: DriverConfig, cli: &Cli) -> Result<DriverConfig> {
    if let Some(fn_mode) = cli.fn_mode {
        config.fn_mode = fn_mode;
    }
    if cli.iso_layout {
        config.iso_layout = true;
    }
    if let Some(debug) = cli.debug {
        config.debug = debug;
    }
    if let Some(product) = &cli.product {
        config.product_name = Some(product.clone());
    }
    if let Some(dims) = &cli.touchpad_dimensions {
        let dims: [i32; 4] = dims
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("--touchpad-dimensions takes exactly 4 values"))?;
        config.touchpad_dimensions = Some(dims);
    }
    Ok(config)
}
