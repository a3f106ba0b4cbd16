use crate::config::Settings;
use crate::errors::{BguError, BguResult};
use crate::supervisor::{StopSignal, WorkUnit};
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "placeholder";

const MIN_INTERVAL_SECONDS: f64 = 1.0;

/// Optional worker slot for future work; only ticks for now.
pub struct PlaceholderService {
    interval: Duration,
}

impl PlaceholderService {
    /// Fails when the service is disabled in settings.
    pub fn try_new(settings: &Settings) -> BguResult<Self> {
        if !settings.placeholder_enabled {
            return Err(BguError::Service(
                "placeholder service is disabled in settings".to_string(),
            ));
        }
        Ok(Self {
            interval: Duration::from_secs_f64(
                settings.service_interval_seconds.max(MIN_INTERVAL_SECONDS),
            ),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl WorkUnit for PlaceholderService {
    fn run(&self, stop: &StopSignal) -> BguResult<()> {
        info!("Starting my_service (placeholder)");
        info!("Tick interval: {:.1}s", self.interval.as_secs_f64());

        let mut ticks: u64 = 0;
        while !stop.is_set() {
            ticks += 1;
            info!("my_service tick #{}", ticks);
            if stop.wait_timeout(self.interval) {
                break;
            }
        }

        info!("my_service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_one_second_floor() {
        let fast = Settings {
            service_interval_seconds: 0.2,
            ..Settings::default()
        };
        assert_eq!(
            PlaceholderService::try_new(&fast).unwrap().interval(),
            Duration::from_secs(1)
        );

        let slow = Settings {
            service_interval_seconds: 7.5,
            ..Settings::default()
        };
        assert_eq!(
            PlaceholderService::try_new(&slow).unwrap().interval(),
            Duration::from_secs_f64(7.5)
        );
    }

    #[test]
    fn disabled_in_settings() {
        let settings = Settings {
            placeholder_enabled: false,
            ..Settings::default()
        };
        assert!(matches!(
            PlaceholderService::try_new(&settings),
            Err(BguError::Service(_))
        ));
    }

    #[test]
    fn stops_on_signal() {
        let service = PlaceholderService::try_new(&Settings::default()).unwrap();
        let stop = StopSignal::new();
        stop.set();
        service.run(&stop).unwrap();
    }
}
