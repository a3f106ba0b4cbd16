use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

mod cli;
mod config;
mod errors;
mod logging;
mod services;
mod supervisor;
mod tray;

use cli::Cli;
use config::Settings;

fn main() -> Result<()> {
    supervisor::signals::mark_primary_thread();
    let cli = Cli::parse();

    // Settings decide the log level, so they load before logging starts
    let settings = Settings::load();
    let level = if cli.verbose {
        "DEBUG"
    } else {
        settings
            .as_ref()
            .map(|settings| settings.log_level.as_str())
            .unwrap_or("INFO")
    };

    // Initialize logging
    logging::init(level, Some(&logging::log_file_path()));

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            return Err(e).context("Failed to load settings");
        }
    };
    debug!(
        "Starting background-utils {} ({} environment)",
        env!("CARGO_PKG_VERSION"),
        settings.environment
    );

    if let Err(e) = cli::run(cli.command, settings) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
