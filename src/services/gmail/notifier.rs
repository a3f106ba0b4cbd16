use crate::errors::BguResult;
use tracing::{info, warn};

/// Desktop notification sink for new-mail announcements.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, title: &str, message: &str) -> BguResult<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> BguResult<()> {
        info!("NOTIFICATION: {} - {}", title, message);
        Ok(())
    }
}

/// Tries `primary`, and hands the notification to `fallback` when it fails.
#[derive(Debug, Default, Clone)]
pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Notifier, F: Notifier> WithFallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: Notifier, F: Notifier> Notifier for WithFallback<P, F> {
    fn notify(&self, title: &str, message: &str) -> BguResult<()> {
        match self.primary.notify(title, message) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Desktop notification failed ({}), logging only", e);
                self.fallback.notify(title, message)
            }
        }
    }
}

#[cfg(windows)]
pub use self::toast::ToastNotifier;

#[cfg(windows)]
mod toast {
    use super::Notifier;
    use crate::errors::{BguError, BguResult};
    use notify_rust::{Notification, Timeout};
    use tracing::info;

    const DISPLAY_MS: u32 = 10_000;

    /// Windows toast via the WinRT notification API.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ToastNotifier;

    impl Notifier for ToastNotifier {
        fn notify(&self, title: &str, message: &str) -> BguResult<()> {
            Notification::new()
                .summary(title)
                .body(message)
                .timeout(Timeout::Milliseconds(DISPLAY_MS))
                .show()
                .map_err(|e| BguError::Notification(e.to_string()))?;
            info!("Notification shown: {}", title);
            Ok(())
        }
    }
}

#[cfg(windows)]
pub type DesktopNotifier = WithFallback<ToastNotifier, LogNotifier>;

#[cfg(not(windows))]
pub type DesktopNotifier = LogNotifier;

/// Toasts on Windows with the log as fallback; the log alone elsewhere.
pub fn desktop() -> DesktopNotifier {
    DesktopNotifier::default()
}
