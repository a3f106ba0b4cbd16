//! Wi-Fi utilities backed by `netsh wlan` (Windows).

use super::table::Table;
use crate::errors::{BguError, BguResult};
use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use crossterm::style::Color;
use serde::Serialize;
use std::process::Command;
use tracing::warn;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum WifiCommand {
    /// Show saved Wi-Fi profiles and their passwords (needs an elevated prompt)
    ShowPasswords {
        #[arg(short, long, value_enum, default_value_t, value_name = "FORMAT")]
        output: OutputFormat,
    },
    /// List visible Wi-Fi networks
    ListNetworks {
        #[arg(short, long, value_enum, default_value_t, value_name = "FORMAT")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiProfile {
    pub name: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WifiNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
}

pub fn run(command: WifiCommand) -> Result<()> {
    match command {
        WifiCommand::ShowPasswords { output } => {
            let profiles = gather_profiles().context("Failed to fetch Wi-Fi profiles")?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profiles)?),
                OutputFormat::Table => {
                    let mut table = Table::new("Wi-Fi Passwords (Windows)")
                        .column("SSID", Color::Cyan)
                        .column("Password", Color::Green);
                    for profile in profiles {
                        table.add_row(vec![
                            profile.name,
                            profile.password.unwrap_or_else(|| "N/A".to_string()),
                        ]);
                    }
                    table.print()?;
                }
            }
        }
        WifiCommand::ListNetworks { output } => {
            let networks = parse_networks(&netsh(&["wlan", "show", "networks"])?);
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&networks)?),
                OutputFormat::Table => {
                    let mut table = Table::new("Available Wi-Fi Networks (Windows)")
                        .column("SSID", Color::Cyan)
                        .column("Type", Color::Magenta)
                        .column("Authentication", Color::Yellow)
                        .column("Encryption", Color::Blue);
                    let or_na = |value: Option<String>| value.unwrap_or_else(|| "N/A".to_string());
                    for network in networks {
                        table.add_row(vec![
                            or_na(network.ssid),
                            or_na(network.network_type),
                            or_na(network.authentication),
                            or_na(network.encryption),
                        ]);
                    }
                    table.print()?;
                }
            }
        }
    }
    Ok(())
}

fn netsh(args: &[&str]) -> BguResult<String> {
    let output = Command::new("netsh")
        .args(args)
        .output()
        .map_err(|e| BguError::Command(format!("Failed to run netsh: {e}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(BguError::Command(format!(
            "netsh {} failed: {}",
            args.join(" "),
            detail
        )));
    }
    Ok(stdout)
}

fn gather_profiles() -> BguResult<Vec<WifiProfile>> {
    let names = parse_profile_names(&netsh(&["wlan", "show", "profiles"])?);
    Ok(names
        .into_iter()
        .map(|name| {
            let selector = format!("name={name}");
            let password = match netsh(&["wlan", "show", "profile", &selector, "key=clear"]) {
                Ok(out) => parse_key_content(&out),
                Err(e) => {
                    warn!("Failed to get key for profile {}: {}", name, e);
                    None
                }
            };
            WifiProfile { name, password }
        })
        .collect())
}

/// Profile names from `netsh wlan show profiles`.
pub fn parse_profile_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("Profile"))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Clear-text key from `netsh wlan show profile name=... key=clear`.
pub fn parse_key_content(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("Key Content"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, key)| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Networks from `netsh wlan show networks`.
pub fn parse_networks(output: &str) -> Vec<WifiNetwork> {
    let mut networks = Vec::new();
    let mut current: Option<WifiNetwork> = None;

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        if key.starts_with("SSID") {
            networks.extend(current.take());
            current = Some(WifiNetwork {
                ssid: value,
                ..WifiNetwork::default()
            });
            continue;
        }

        let network = current.get_or_insert_with(WifiNetwork::default);
        if key.starts_with("Network type") {
            network.network_type = value;
        } else if key.starts_with("Authentication") {
            network.authentication = value;
        } else if key.starts_with("Encryption") {
            network.encryption = value;
        }
    }
    networks.extend(current);
    networks
}
