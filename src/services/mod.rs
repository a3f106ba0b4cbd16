//! Built-in work units and the default service set.

pub mod battery;
pub mod example;
pub mod gmail;
pub mod placeholder;

use crate::config::Settings;
use crate::errors::BguResult;
use crate::supervisor::{ServiceSpec, ServiceSupervisor, WorkUnit};
use tracing::warn;

pub use self::battery::BatteryMonitor;
pub use example::ExampleService;
pub use gmail::GmailNotifier;
pub use placeholder::PlaceholderService;

/// `example`, `battery`, `gmail`, then `placeholder` when it can be built.
pub fn default_services(settings: &Settings) -> Vec<ServiceSpec> {
    let mut services = vec![
        ServiceSpec::new(example::NAME, ExampleService::new(settings)),
        ServiceSpec::new(battery::NAME, BatteryMonitor::new(settings)),
        ServiceSpec::new(gmail::NAME, GmailNotifier::new(settings)),
    ];
    register_optional(
        &mut services,
        placeholder::NAME,
        PlaceholderService::try_new(settings),
    );
    services
}

/// Append an optional unit, or log why it was left out.
fn register_optional<U: WorkUnit>(
    services: &mut Vec<ServiceSpec>,
    name: &str,
    unit: BguResult<U>,
) {
    match unit {
        Ok(unit) => services.push(ServiceSpec::new(name, unit)),
        Err(e) => warn!("Optional service '{}' not available: {}", name, e),
    }
}

/// Supervisor over [`default_services`] with the configured shutdown budget.
pub fn build_supervisor(settings: &Settings) -> BguResult<ServiceSupervisor> {
    ServiceSupervisor::new(default_services(settings), settings.shutdown_timeout())
}
