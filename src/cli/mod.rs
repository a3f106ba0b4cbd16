pub mod example;
pub mod settings;
pub mod table;
pub mod wifi;

use crate::config::Settings;
use crate::logging;
use crate::services;
use crate::tray::TrayController;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::warn;

use example::ExampleCommand;
use settings::ConfigCommand;
use wifi::WifiCommand;

#[derive(Debug, Parser)]
#[command(name = "background-utils", author, version, about = "Background Utilities CLI")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Enable verbose logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Example commands
    #[command(subcommand)]
    Example(ExampleCommand),
    /// Wi-Fi utilities (Windows)
    #[command(subcommand)]
    Wifi(WifiCommand),
    /// Background services
    #[command(subcommand)]
    Services(ServicesCommand),
    /// Run the services behind a system tray icon
    Tray,
    /// Inspect or create the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ServicesCommand {
    /// Run all services in the foreground until interrupted
    Run,
}

pub fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Example(command) => example::run(command),
        Commands::Wifi(command) => wifi::run(command),
        Commands::Services(ServicesCommand::Run) => run_services(&settings),
        Commands::Tray => run_tray(settings),
        Commands::Config(command) => settings::run(command, &settings),
    }
}

fn run_services(settings: &Settings) -> Result<()> {
    let supervisor =
        services::build_supervisor(settings).context("Failed to build the service set")?;
    let report = supervisor.run().context("Service supervisor failed")?;
    if !report.is_clean() {
        warn!("Waiting for services to exit: {:?}", report.still_alive);
    }
    // Service threads are not detached; the process lives until they return.
    supervisor.join_remaining();
    Ok(())
}

fn run_tray(settings: Settings) -> Result<()> {
    let controller = Arc::new(TrayController::new(
        move || services::build_supervisor(&settings),
        logging::log_file_path,
    ));
    controller.run().context("Tray controller failed")
}
