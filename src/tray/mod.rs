//! Tray controller: the bridge between menu clicks and the service supervisor.
//!
//! Owns at most one [`ServiceSupervisor`] at a time. Menu actions run on
//! short-lived background threads and are serialized against each other;
//! once `exit()` has begun every further action is a no-op.

pub mod host;
pub mod icon;
pub mod menu;

use crate::errors::{BguError, BguResult};
use crate::supervisor::shutdown::lock;
use crate::supervisor::{signals, ServiceSupervisor, StopSignal, SupervisorState};
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use host::TrayHost;
pub use menu::TrayCommand;

/// Longest a restart waits for the old supervisor to finish stopping.
pub const RESTART_WAIT: Duration = Duration::from_secs(5);
/// Pause between a full stop and the fresh start during restart.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

const IDLE_POLL: Duration = Duration::from_millis(500);

type Factory = Box<dyn Fn() -> BguResult<ServiceSupervisor> + Send + Sync>;
type LogPathProvider = Box<dyn Fn() -> PathBuf + Send + Sync>;
type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

#[derive(Default)]
struct ControllerState {
    supervisor: Option<Arc<ServiceSupervisor>>,
    exiting: bool,
}

pub struct TrayController {
    factory: Factory,
    log_path: LogPathProvider,
    exit_hook: ExitHook,
    state: Mutex<ControllerState>,
    /// Held for the whole of a stop or restart.
    actions: Mutex<()>,
    /// Raised by an interrupt or by `exit()`; wakes the idle loop in `run()`.
    wake: StopSignal,
    host: Mutex<Option<TrayHost>>,
}

impl TrayController {
    pub fn new<F, L>(factory: F, log_path: L) -> Self
    where
        F: Fn() -> BguResult<ServiceSupervisor> + Send + Sync + 'static,
        L: Fn() -> PathBuf + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            log_path: Box::new(log_path),
            exit_hook: Box::new(|code| std::process::exit(code)),
            state: Mutex::new(ControllerState::default()),
            actions: Mutex::new(()),
            wake: StopSignal::new(),
            host: Mutex::new(None),
        }
    }

    /// Replace process termination, e.g. to observe `exit()` in tests.
    pub fn with_exit_hook(mut self, hook: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit_hook = Box::new(hook);
        self
    }

    pub fn current_supervisor(&self) -> Option<Arc<ServiceSupervisor>> {
        lock(&self.state).supervisor.clone()
    }

    pub fn is_exiting(&self) -> bool {
        lock(&self.state).exiting
    }

    /// Current supervisor, unless exit has begun.
    fn active_supervisor(&self) -> Option<Arc<ServiceSupervisor>> {
        let state = lock(&self.state);
        if state.exiting {
            debug!("Ignoring tray action: exit in progress");
            return None;
        }
        state.supervisor.clone()
    }

    /// Create the supervisor if there is none and run it on a background thread.
    pub fn launch(self: &Arc<Self>) -> BguResult<JoinHandle<()>> {
        let supervisor = {
            let mut state = lock(&self.state);
            if state.exiting {
                return Err(BguError::Service("exit in progress".to_string()));
            }
            match &state.supervisor {
                Some(existing) => existing.clone(),
                None => {
                    let created = Arc::new((self.factory)()?);
                    state.supervisor = Some(created.clone());
                    created
                }
            }
        };

        let controller = Arc::clone(self);
        self.spawn_task("svc-runner", move || {
            if controller.activate(&supervisor) {
                watch(&supervisor);
            }
        })
    }

    /// Start `supervisor` and make it current, unless exit has begun.
    ///
    /// Runs under the state lock so `exit()` either sees the new supervisor
    /// running or prevents it from starting.
    fn activate(&self, supervisor: &Arc<ServiceSupervisor>) -> bool {
        let mut state = lock(&self.state);
        if state.exiting {
            info!("Exit in progress, not starting services");
            return false;
        }
        if matches!(
            supervisor.state(),
            SupervisorState::Starting | SupervisorState::Running
        ) {
            debug!("Services already running");
            return false;
        }
        if let Err(e) = supervisor.start() {
            error!("Failed to start services: {}", e);
            return false;
        }
        state.supervisor = Some(supervisor.clone());
        true
    }

    fn spawn_task<F>(&self, name: &str, task: F) -> BguResult<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(task)
            .map_err(|e| BguError::Service(format!("Failed to spawn {name}: {e}")))
    }

    /// Open the log file in a viewer process.
    pub fn view_log(&self) {
        let path = (self.log_path)();
        if !path.exists() {
            warn!("Log file does not exist yet: {}", path.display());
        }
        match viewer_command(&path).spawn() {
            Ok(_) => info!("Opened log file {}", path.display()),
            Err(e) => error!("Failed to open log file {}: {}", path.display(), e),
        }
    }

    pub fn stop_services(self: &Arc<Self>) -> BguResult<JoinHandle<()>> {
        let controller = Arc::clone(self);
        self.spawn_task("tray-stop", move || controller.stop_blocking())
    }

    fn stop_blocking(&self) {
        let _serial = lock(&self.actions);
        let Some(supervisor) = self.active_supervisor() else {
            return;
        };

        info!("Stopping services from tray...");
        let report = supervisor.stop();
        if report.is_clean() {
            info!("Services stopped");
        } else {
            warn!("Services stopped; still running: {:?}", report.still_alive);
        }
    }

    pub fn restart_services(self: &Arc<Self>) -> BguResult<JoinHandle<()>> {
        let controller = Arc::clone(self);
        self.spawn_task("tray-restart", move || controller.restart_blocking())
    }

    fn restart_blocking(&self) {
        let _serial = lock(&self.actions);
        if self.is_exiting() {
            debug!("Ignoring restart: exit in progress");
            return;
        }

        info!("Restarting services...");
        if let Some(old) = self.current_supervisor() {
            old.stop();
            if !old.completion().wait_timeout(RESTART_WAIT) {
                warn!(
                    "Previous services did not finish stopping within {:.1}s",
                    RESTART_WAIT.as_secs_f64()
                );
            }
        }
        thread::sleep(SETTLE_DELAY);

        let fresh = match (self.factory)() {
            Ok(supervisor) => Arc::new(supervisor),
            Err(e) => {
                error!("Failed to create services for restart: {}", e);
                return;
            }
        };
        if !self.activate(&fresh) {
            return;
        }

        let runner = Arc::clone(&fresh);
        match self.spawn_task("svc-restart", move || watch(&runner)) {
            Ok(_) => info!("Services restarted"),
            Err(e) => {
                error!("{}", e);
                fresh.stop();
            }
        }
    }

    pub fn exit(self: &Arc<Self>) -> BguResult<JoinHandle<()>> {
        let controller = Arc::clone(self);
        self.spawn_task("tray-exit", move || controller.exit_blocking())
    }

    fn exit_blocking(&self) {
        let supervisor = {
            let mut state = lock(&self.state);
            if state.exiting {
                debug!("Exit already in progress");
                return;
            }
            state.exiting = true;
            state.supervisor.clone()
        };

        info!("Exiting...");
        if let Some(supervisor) = supervisor {
            supervisor.stop();
        }
        if let Some(host) = lock(&self.host).take() {
            host.shutdown();
        }
        self.wake.set();
        (self.exit_hook)(0);
    }

    /// Route one menu command onto its action.
    pub fn dispatch(self: &Arc<Self>, command: TrayCommand) {
        debug!("Tray command: {:?}", command);
        let spawned = match command {
            TrayCommand::ViewLog => {
                self.view_log();
                return;
            }
            TrayCommand::StopServices => self.stop_services(),
            TrayCommand::RestartServices => self.restart_services(),
            TrayCommand::Exit => self.exit(),
        };
        if let Err(e) = spawned {
            error!("Tray action {:?} failed: {}", command, e);
        }
    }

    /// Run services plus the tray icon, falling back to headless mode.
    ///
    /// Blocks until `exit()` or an interrupt.
    pub fn run(self: &Arc<Self>) -> BguResult<()> {
        self.launch()?;

        if signals::is_primary_thread() {
            if let Err(e) = signals::spawn_listener(self.wake.clone()) {
                debug!("Skipping signal handlers due to: {}", e);
            }
        }

        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let headless = match host::spawn(commands_tx) {
            Ok(host) => {
                *lock(&self.host) = Some(host);
                self.spawn_dispatcher(commands_rx)?;
                info!("Tray icon running");
                false
            }
            Err(e) => {
                warn!("Tray icon unavailable ({}); running headless. Press Ctrl+C to stop.", e);
                true
            }
        };

        while !self.wake.wait_timeout(IDLE_POLL) {
            if self.is_exiting() {
                break;
            }
        }
        if self.is_exiting() {
            return Ok(());
        }

        info!("Interrupt received, stopping services...");
        let supervisor = self.current_supervisor();
        if let Some(supervisor) = &supervisor {
            supervisor.stop();
        }
        if headless {
            lock(&self.state).exiting = true;
            // Same as `services run`: the process outlives its service threads.
            if let Some(supervisor) = supervisor {
                supervisor.join_remaining();
            }
        } else {
            self.exit_blocking();
        }
        Ok(())
    }

    fn spawn_dispatcher(self: &Arc<Self>, commands: Receiver<TrayCommand>) -> BguResult<()> {
        let controller = Arc::clone(self);
        self.spawn_task("tray-dispatch", move || {
            for command in commands {
                controller.dispatch(command);
            }
            debug!("Tray dispatcher exiting");
        })?;
        Ok(())
    }
}

/// Body of a supervisor's runner thread once it has started.
fn watch(supervisor: &ServiceSupervisor) {
    supervisor.wait();
    let report = supervisor.stop();
    if !report.is_clean() {
        warn!("Services still running after stop: {:?}", report.still_alive);
    }
}

fn viewer_command(path: &Path) -> Command {
    let program = if cfg!(windows) {
        "notepad"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut command = Command::new(program);
    command.arg(path);
    command
}
