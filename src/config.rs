use crate::errors::{BguError, BguResult};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config and data roots.
pub const APP_DIR: &str = "background-utils";

const ENV_PREFIX: &str = "BGU";
const MIN_SERVICE_INTERVAL_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Example service tick interval
    #[serde(default = "default_service_interval")]
    pub service_interval_seconds: f64,
    /// Total budget `stop()` may spend joining service threads
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: f64,
    #[serde(default = "default_poll_interval")]
    pub battery_interval_seconds: f64,
    #[serde(default = "default_battery_low_percent")]
    pub battery_low_percent: u8,
    #[serde(default = "default_poll_interval")]
    pub gmail_check_interval_seconds: f64,
    #[serde(default)]
    pub gmail_email: Option<String>,
    /// Gmail app password. Only ever read from the file or environment.
    #[serde(default, skip_serializing)]
    pub gmail_password: Option<String>,
    #[serde(default = "default_true")]
    pub placeholder_enabled: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_service_interval() -> f64 {
    5.0
}

fn default_shutdown_timeout() -> f64 {
    10.0
}

fn default_poll_interval() -> f64 {
    60.0
}

fn default_battery_low_percent() -> u8 {
    15
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment: default_environment(),
            service_interval_seconds: default_service_interval(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            battery_interval_seconds: default_poll_interval(),
            battery_low_percent: default_battery_low_percent(),
            gmail_check_interval_seconds: default_poll_interval(),
            gmail_email: None,
            gmail_password: None,
            placeholder_enabled: default_true(),
        }
    }
}

impl Settings {
    /// Load from the user config file (optional) overridden by `BGU_*` variables.
    pub fn load() -> BguResult<Self> {
        Self::load_from(&Self::config_path(), None)
    }

    /// `env` replaces the process environment when given.
    pub fn load_from(path: &Path, env: Option<HashMap<String, String>>) -> BguResult<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> BguResult<()> {
        if !(self.service_interval_seconds >= MIN_SERVICE_INTERVAL_SECONDS) {
            return Err(BguError::Config(format!(
                "service_interval_seconds must be >= {MIN_SERVICE_INTERVAL_SECONDS}, got {}",
                self.service_interval_seconds
            )));
        }
        for (name, value) in [
            ("service_interval_seconds", self.service_interval_seconds),
            ("shutdown_timeout_seconds", self.shutdown_timeout_seconds),
            ("battery_interval_seconds", self.battery_interval_seconds),
            ("gmail_check_interval_seconds", self.gmail_check_interval_seconds),
        ] {
            // Rejects NaN, negatives and values too large for a Duration.
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(BguError::Config(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if self.battery_low_percent > 100 {
            return Err(BguError::Config(format!(
                "battery_low_percent must be at most 100, got {}",
                self.battery_low_percent
            )));
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> BguResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BguError::Config(format!("Failed to encode settings: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Rendered for `config show`; the password never appears.
    pub fn to_toml(&self) -> BguResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BguError::Config(format!("Failed to encode settings: {e}")))
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn service_interval(&self) -> Duration {
        seconds(self.service_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        seconds(self.shutdown_timeout_seconds)
    }

    pub fn battery_interval(&self) -> Duration {
        seconds(self.battery_interval_seconds)
    }

    pub fn gmail_check_interval(&self) -> Duration {
        seconds(self.gmail_check_interval_seconds)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Per-user data directory holding the log file and the mail UID marker.
///
/// `%LOCALAPPDATA%\background-utils` on Windows, falling back to `./logs`
/// when the platform offers no local data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join("logs"))
}
