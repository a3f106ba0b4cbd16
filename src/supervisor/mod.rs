//! # Service supervisor
//!
//! Runs a fixed set of named work units, one OS thread each, against a single
//! broadcast [`StopSignal`].
//!
//! ```text
//!   Idle ──start()──▶ Starting ──spawned──▶ Running
//!                                             │ stop()
//!   Starting ◀──start()── Stopped ◀──joined── Stopping
//! ```
//!
//! - A unit that fails or panics is logged by its wrapper; siblings keep running
//!   and the stop signal is left alone.
//! - `stop()` shares one deadline across all joins, in registration order.
//!   Threads still running when it expires are reported, never killed.
//! - `stop()` calls are serialized; a repeated call re-attempts outstanding joins.

pub mod shutdown;
pub mod signals;

#[cfg(test)]
mod tests;

use crate::errors::{BguError, BguResult};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub use shutdown::{CompletionMarker, StopSignal};

use shutdown::lock;

/// Cadence of the liveness heartbeat in [`ServiceSupervisor::wait`].
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A unit of background work: run until the stop signal is raised.
pub trait WorkUnit: Send + Sync + 'static {
    fn run(&self, stop: &StopSignal) -> BguResult<()>;
}

struct FnUnit<F>(F);

impl<F> WorkUnit for FnUnit<F>
where
    F: Fn(&StopSignal) -> BguResult<()> + Send + Sync + 'static,
{
    fn run(&self, stop: &StopSignal) -> BguResult<()> {
        (self.0)(stop)
    }
}

/// Named entry point registered with a supervisor.
#[derive(Clone)]
pub struct ServiceSpec {
    name: String,
    target: Arc<dyn WorkUnit>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, unit: impl WorkUnit) -> Self {
        Self {
            name: name.into(),
            target: Arc::new(unit),
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StopSignal) -> BguResult<()> + Send + Sync + 'static,
    {
        Self::new(name, FnUnit(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Outcome of one `stop()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Services whose threads outlived the shutdown budget, in registration order.
    pub still_alive: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.still_alive.is_empty()
    }
}

struct ServiceThread {
    service: String,
    handle: Option<JoinHandle<()>>,
    exited: CompletionMarker,
}

impl ServiceThread {
    fn thread_name(&self) -> String {
        thread_name(&self.service)
    }

    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `timeout` for the wrapper to exit; joins the handle if it did.
    fn join_timeout(&mut self, timeout: Duration) -> bool {
        if !self.exited.wait_timeout(timeout) {
            return false;
        }
        if let Some(handle) = self.handle.take() {
            // The wrapper catches unit panics, so this cannot carry one.
            let _ = handle.join();
        }
        true
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn thread_name(service: &str) -> String {
    format!("svc-{service}")
}

fn alive(threads: &[ServiceThread]) -> Vec<String> {
    threads
        .iter()
        .filter(|t| t.is_alive())
        .map(|t| t.service.clone())
        .collect()
}

pub struct ServiceSupervisor {
    services: Vec<ServiceSpec>,
    shutdown_timeout: Duration,
    stop_signal: Mutex<StopSignal>,
    stopped: CompletionMarker,
    threads: Mutex<Vec<ServiceThread>>,
    state: Mutex<SupervisorState>,
}

impl ServiceSupervisor {
    /// Names must be non-empty and unique.
    pub fn new(
        services: impl IntoIterator<Item = ServiceSpec>,
        shutdown_timeout: Duration,
    ) -> BguResult<Self> {
        let services: Vec<ServiceSpec> = services.into_iter().collect();
        let mut seen = HashSet::new();
        for spec in &services {
            if spec.name.trim().is_empty() {
                return Err(BguError::InvalidInput(
                    "service name must not be empty".to_string(),
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(BguError::InvalidInput(format!(
                    "duplicate service name: {}",
                    spec.name
                )));
            }
        }

        Ok(Self {
            services,
            shutdown_timeout,
            stop_signal: Mutex::new(StopSignal::new()),
            stopped: CompletionMarker::new(),
            threads: Mutex::new(Vec::new()),
            state: Mutex::new(SupervisorState::Idle),
        })
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Handle to the current cycle's stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        lock(&self.stop_signal).clone()
    }

    /// Raised once a stop cycle has finished its join attempts.
    pub fn completion(&self) -> &CompletionMarker {
        &self.stopped
    }

    pub fn state(&self) -> SupervisorState {
        *lock(&self.state)
    }

    /// Thread handles registered by the last `start()`.
    pub fn thread_count(&self) -> usize {
        lock(&self.threads).len()
    }

    /// Services whose threads are still running.
    pub fn alive_services(&self) -> Vec<String> {
        alive(&lock(&self.threads))
    }

    fn set_state(&self, next: SupervisorState) {
        let mut state = lock(&self.state);
        debug!("Supervisor state {:?} -> {:?}", *state, next);
        *state = next;
    }

    pub fn start(&self) -> BguResult<()> {
        let mut threads = lock(&self.threads);
        self.set_state(SupervisorState::Starting);

        let stragglers = alive(&threads);
        let stop = {
            let mut signal = lock(&self.stop_signal);
            if stragglers.is_empty() {
                signal.clear();
            } else {
                // Stragglers keep the raised signal of their own cycle.
                warn!(
                    "Services from the previous cycle still running: {:?}",
                    stragglers
                );
                *signal = StopSignal::new();
            }
            signal.clone()
        };
        self.stopped.clear();
        threads.clear();

        let names: Vec<&str> = self.services.iter().map(ServiceSpec::name).collect();
        let names = if names.is_empty() {
            "<none>".to_string()
        } else {
            names.join(", ")
        };
        info!(
            "Service supervisor starting {} services: {}",
            self.services.len(),
            names
        );

        self.install_signal_handlers(&stop);

        for spec in &self.services {
            info!("Launching service: {}", spec.name);
            let exited = CompletionMarker::new();
            let spawned = thread::Builder::new().name(thread_name(&spec.name)).spawn({
                let spec = spec.clone();
                let stop = stop.clone();
                let exited = exited.clone();
                move || run_service(spec, stop, exited)
            });

            match spawned {
                Ok(handle) => {
                    threads.push(ServiceThread {
                        service: spec.name.clone(),
                        handle: Some(handle),
                        exited,
                    });
                    info!("Service thread started: {}", spec.name);
                }
                Err(e) => {
                    error!("Failed to spawn thread for {}: {}", spec.name, e);
                    drop(threads);
                    self.stop();
                    return Err(BguError::Service(format!(
                        "failed to spawn service {}: {e}",
                        spec.name
                    )));
                }
            }
        }

        self.set_state(SupervisorState::Running);
        Ok(())
    }

    fn install_signal_handlers(&self, stop: &StopSignal) {
        if !signals::is_primary_thread() {
            debug!("Skipping signal handlers (not in main thread)");
            return;
        }
        match signals::spawn_listener(stop.clone()) {
            Ok(()) => debug!("Signal handlers installed"),
            Err(e) => debug!("Skipping signal handlers due to: {}", e),
        }
    }

    /// Block until the stop signal is raised, logging a heartbeat every second.
    pub fn wait(&self) {
        let stop = self.stop_signal();
        while !stop.wait_timeout(HEARTBEAT_INTERVAL) {
            debug!(
                "Supervisor heartbeat; alive threads: {:?}",
                self.alive_services()
            );
        }
    }

    /// Raise the stop signal and join service threads within the shutdown budget.
    pub fn stop(&self) -> StopReport {
        let mut threads = lock(&self.threads);

        if self.stop_signal().set() {
            info!("Stopping services...");
            info!("Stop signal set. Active threads: {:?}", alive(&threads));
        } else {
            debug!("Stop requested (already stopping)");
        }
        if self.state() != SupervisorState::Stopped {
            self.set_state(SupervisorState::Stopping);
        }

        if threads.is_empty() {
            info!("No threads to stop");
            self.finish_stop();
            return StopReport::default();
        }

        info!(
            "Joining {} threads with {:.1}s timeout...",
            threads.len(),
            self.shutdown_timeout.as_secs_f64()
        );
        let deadline = Instant::now().checked_add(self.shutdown_timeout);
        let total = threads.len();
        for (index, thread) in threads.iter_mut().enumerate() {
            if thread.handle.is_none() {
                continue;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                warn!("Timeout reached, skipping remaining threads");
                break;
            }
            info!(
                "Joining thread {}/{}: {} (timeout: {:.1}s)",
                index + 1,
                total,
                thread.thread_name(),
                remaining.as_secs_f64()
            );
            if thread.join_timeout(remaining) {
                info!("Thread {} stopped successfully", thread.thread_name());
            } else {
                warn!("Thread {} still alive after join", thread.thread_name());
            }
        }

        let still_alive = alive(&threads);
        if still_alive.is_empty() {
            info!("All services stopped cleanly.");
        } else {
            warn!("Some services did not stop in time: {:?}", still_alive);
        }
        self.finish_stop();
        info!("ServiceSupervisor::stop() completed");
        StopReport { still_alive }
    }

    fn finish_stop(&self) {
        self.set_state(SupervisorState::Stopped);
        self.stopped.set();
    }

    /// `start()`, then `wait()`, then `stop()`.
    pub fn run(&self) -> BguResult<StopReport> {
        self.start()?;
        self.wait();
        Ok(self.stop())
    }

    /// Join every remaining service thread without a deadline.
    pub fn join_remaining(&self) {
        let mut threads = lock(&self.threads);
        for thread in threads.iter_mut() {
            if thread.is_alive() {
                info!("Waiting for {} to exit", thread.thread_name());
            }
            thread.join();
        }
    }
}

impl fmt::Debug for ServiceSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSupervisor")
            .field("services", &self.services)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-thread wrapper: nothing a unit returns or panics with leaves this frame.
fn run_service(spec: ServiceSpec, stop: StopSignal, exited: CompletionMarker) {
    let _exited = ExitGuard(exited);
    let name = spec.name();
    info!("[{}] run() entering", name);
    match panic::catch_unwind(AssertUnwindSafe(|| spec.target.run(&stop))) {
        Ok(Ok(())) => info!("[{}] run() exited normally", name),
        Ok(Err(e)) => error!("[{}] crashed: {}", name, e),
        Err(payload) => error!("[{}] panicked: {}", name, panic_message(payload.as_ref())),
    }
    info!("[{}] wrapper exiting", name);
}

struct ExitGuard(CompletionMarker);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
