//! Battery monitor.
//!
//! Polls the first system battery and warns when it runs low while unplugged.

use crate::config::Settings;
use crate::errors::{BguError, BguResult};
use crate::supervisor::{StopSignal, WorkUnit};
use battery::{Battery, Manager, State};
use std::time::Duration;
use tracing::{error, info, warn};

pub const NAME: &str = "battery";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub percent: f32,
    pub plugged: bool,
}

impl BatteryReading {
    pub fn is_low(&self, threshold: u8) -> bool {
        self.percent < f32::from(threshold) && !self.plugged
    }
}

/// Source of battery readings.
pub trait BatteryProbe: Send + Sync + 'static {
    /// `Ok(None)` when the machine reports no battery.
    fn read(&self) -> BguResult<Option<BatteryReading>>;
}

/// Reads the OS battery through the `battery` crate.
pub struct SystemBattery;

impl BatteryProbe for SystemBattery {
    fn read(&self) -> BguResult<Option<BatteryReading>> {
        let manager = Manager::new()
            .map_err(|e| BguError::Battery(format!("Failed to create battery manager: {e}")))?;
        let mut batteries = manager
            .batteries()
            .map_err(|e| BguError::Battery(format!("Failed to get batteries: {e}")))?;

        match batteries.next() {
            Some(Ok(battery)) => Ok(Some(reading_from(&battery))),
            Some(Err(e)) => Err(BguError::Battery(format!("Error reading battery: {e}"))),
            None => Ok(None),
        }
    }
}

fn reading_from(battery: &Battery) -> BatteryReading {
    let plugged = match battery.state() {
        State::Charging | State::Full => true,
        State::Discharging | State::Empty => false,
        // Some firmwares report Unknown while on AC and holding a charge threshold.
        State::Unknown => battery.energy_rate().value > 0.0,
        _ => false,
    };
    BatteryReading {
        percent: battery.state_of_charge().value * 100.0,
        plugged,
    }
}

pub struct BatteryMonitor<P = SystemBattery> {
    probe: P,
    interval: Duration,
    low_percent: u8,
}

impl BatteryMonitor<SystemBattery> {
    pub fn new(settings: &Settings) -> Self {
        Self::with_probe(SystemBattery, settings)
    }
}

impl<P: BatteryProbe> BatteryMonitor<P> {
    pub fn with_probe(probe: P, settings: &Settings) -> Self {
        Self {
            probe,
            interval: settings.battery_interval(),
            low_percent: settings.battery_low_percent,
        }
    }

    /// One poll; returns the reading that was logged, if any.
    fn check(&self) -> Option<BatteryReading> {
        match self.probe.read() {
            Ok(Some(reading)) => {
                info!("Battery percentage: {:.0}%", reading.percent);
                if reading.plugged {
                    info!("Power is plugged in.");
                } else {
                    info!("Power is not plugged in.");
                }
                if reading.is_low(self.low_percent) {
                    warn!("Battery low! Plug in the charger.");
                }
                Some(reading)
            }
            Ok(None) => {
                warn!("Battery information not available");
                None
            }
            Err(e) => {
                error!("Error checking battery status: {}", e);
                None
            }
        }
    }
}

impl<P: BatteryProbe> WorkUnit for BatteryMonitor<P> {
    fn run(&self, stop: &StopSignal) -> BguResult<()> {
        info!("Starting battery monitor");
        while !stop.is_set() {
            self.check();
            if stop.wait_timeout(self.interval) {
                break;
            }
        }
        info!("Battery monitor stopped");
        Ok(())
    }
}
