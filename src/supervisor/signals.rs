//! Process termination signals (interrupt / terminate).
//!
//! The listener owns a small current-thread Tokio runtime on its own thread
//! and raises a [`StopSignal`] when a signal arrives. It exits on its own once
//! that stop signal is raised by anyone else.

use crate::errors::{BguError, BguResult};
use crate::supervisor::shutdown::StopSignal;
use std::fmt;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, info};

const CANCEL_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => write!(f, "SIGINT"),
            TerminationSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

static PRIMARY_THREAD: OnceLock<ThreadId> = OnceLock::new();

/// Record the calling thread as the process's primary thread. First call wins.
pub fn mark_primary_thread() {
    let _ = PRIMARY_THREAD.set(thread::current().id());
}

/// Whether the caller is the thread passed to [`mark_primary_thread`].
///
/// Signal handlers are only installed from there; background threads (the
/// tray's service runner, restart tasks) skip installation. Nothing counts
/// as primary until a thread has been marked.
pub fn is_primary_thread() -> bool {
    PRIMARY_THREAD.get() == Some(&thread::current().id())
}

/// Start listening for termination signals on a dedicated thread.
pub fn spawn_listener(trigger: StopSignal) -> BguResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| BguError::Signal(format!("Failed to build signal runtime: {e}")))?;

    let signals = {
        let _context = runtime.enter();
        Signals::register()
            .map_err(|e| BguError::Signal(format!("Failed to register handlers: {e}")))?
    };

    thread::Builder::new()
        .name("svc-signals".into())
        .spawn(move || runtime.block_on(listen(signals, trigger)))
        .map_err(|e| BguError::Signal(format!("Failed to spawn signal listener: {e}")))?;
    Ok(())
}

async fn listen(mut signals: Signals, trigger: StopSignal) {
    loop {
        tokio::select! {
            Some(received) = signals.recv() => {
                info!("Received signal {}. Initiating shutdown...", received);
                trigger.set();
                return;
            }
            _ = tokio::time::sleep(CANCEL_POLL) => {
                if trigger.is_set() {
                    debug!("Signal listener exiting");
                    return;
                }
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Option<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(TerminationSignal::Terminate),
            else => None,
        }
    }
}

// Console close is the closest Windows has to SIGTERM.
#[cfg(windows)]
struct Signals {
    interrupt: tokio::signal::windows::CtrlC,
    terminate: tokio::signal::windows::CtrlClose,
}

#[cfg(windows)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: tokio::signal::windows::ctrl_c()?,
            terminate: tokio::signal::windows::ctrl_close()?,
        })
    }

    async fn recv(&mut self) -> Option<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(TerminationSignal::Terminate),
            else => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(TerminationSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }

    #[test]
    fn only_the_marked_thread_is_primary() {
        let marked = thread::spawn(|| {
            mark_primary_thread();
            is_primary_thread()
        })
        .join()
        .unwrap();
        assert!(marked);

        assert!(!is_primary_thread());
        let named_main = thread::Builder::new()
            .name("main".into())
            .spawn(is_primary_thread)
            .unwrap()
            .join()
            .unwrap();
        assert!(!named_main);
    }

    #[test]
    fn listener_leaves_trigger_alone_until_signalled() {
        let trigger = StopSignal::new();
        spawn_listener(trigger.clone()).unwrap();
        assert!(!trigger.wait_timeout(Duration::from_millis(100)));
        // Raising the trigger releases the listener thread.
        trigger.set();
    }
}
