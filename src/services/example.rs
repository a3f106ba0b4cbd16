use crate::config::Settings;
use crate::errors::BguResult;
use crate::supervisor::{StopSignal, WorkUnit};
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "example";

/// Ticker that logs a counter every `service_interval_seconds`.
pub struct ExampleService {
    environment: String,
    interval: Duration,
}

impl ExampleService {
    pub fn new(settings: &Settings) -> Self {
        Self {
            environment: settings.environment.clone(),
            interval: settings.service_interval(),
        }
    }
}

impl WorkUnit for ExampleService {
    fn run(&self, stop: &StopSignal) -> BguResult<()> {
        info!("Starting example service");
        info!("Environment: {}", self.environment);
        info!("Tick interval: {:.1}s", self.interval.as_secs_f64());

        let mut ticks: u64 = 0;
        while !stop.is_set() {
            ticks += 1;
            info!("Service tick #{}", ticks);
            if stop.wait_timeout(self.interval) {
                break;
            }
        }

        info!("Service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn exits_within_one_wait_slice() {
        let settings = Settings {
            service_interval_seconds: 30.0,
            ..Settings::default()
        };
        let service = ExampleService::new(&settings);
        let stop = StopSignal::new();

        let setter = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            setter.set();
        });

        let started = Instant::now();
        service.run(&stop).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn returns_immediately_when_already_stopped() {
        let service = ExampleService::new(&Settings::default());
        let stop = StopSignal::new();
        stop.set();
        service.run(&stop).unwrap();
    }
}
