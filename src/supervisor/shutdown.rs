use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Latch {
    set: Mutex<bool>,
    changed: Condvar,
}

impl Latch {
    /// Returns `true` only for the call that flipped the latch.
    fn set(&self) -> bool {
        let mut set = lock(&self.set);
        let first = !*set;
        *set = true;
        self.changed.notify_all();
        first
    }

    fn clear(&self) {
        *lock(&self.set) = false;
    }

    fn is_set(&self) -> bool {
        *lock(&self.set)
    }

    fn wait(&self) {
        let mut set = lock(&self.set);
        while !*set {
            set = self
                .changed
                .wait(set)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut set = lock(&self.set);
        while !*set {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                break;
            }
            set = self
                .changed
                .wait_timeout(set, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *set
    }
}

/// Broadcast stop flag shared by the supervisor and every work unit.
///
/// Clones share the same flag. Work units poll [`StopSignal::is_set`] or
/// sleep through [`StopSignal::wait_timeout`], which returns as soon as the
/// signal is raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Latch>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns `true` if this call made the false→true transition.
    pub fn set(&self) -> bool {
        self.inner.set()
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_set()
    }

    /// Block until the signal is raised.
    pub fn wait(&self) {
        self.inner.wait()
    }

    /// Sleep for at most `timeout`; returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_timeout(timeout)
    }

    pub(crate) fn clear(&self) {
        self.inner.clear()
    }
}

/// One-shot marker raised when a stop cycle has finished its join attempts.
#[derive(Debug, Clone, Default)]
pub struct CompletionMarker {
    inner: Arc<Latch>,
}

impl CompletionMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_set()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_timeout(timeout)
    }

    pub(crate) fn set(&self) -> bool {
        self.inner.set()
    }

    pub(crate) fn clear(&self) {
        self.inner.clear()
    }
}
