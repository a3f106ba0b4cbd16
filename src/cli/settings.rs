use crate::config::Settings;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings as TOML (password omitted)
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommand, settings: &Settings) -> Result<()> {
    match command {
        ConfigCommand::Show => print!("{}", settings.to_toml()?),
        ConfigCommand::Path => println!("{}", Settings::config_path().display()),
        ConfigCommand::Init { force } => {
            let path = Settings::config_path();
            if write_default(&path, force)? {
                println!("Wrote default config to {}", path.display());
            } else {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }
    Ok(())
}

/// Returns `false` when the file exists and `force` is unset.
fn write_default(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    Settings::default()
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
