//! Gmail new-mail poller.
//!
//! Keeps one IMAP session open, remembers the highest UID it has announced in
//! a marker file, and raises a notification for every message above it.

pub mod headers;
pub mod imap;
pub mod notifier;
pub mod uid_store;

use crate::config::Settings;
use crate::errors::BguResult;
use crate::supervisor::{StopSignal, WorkUnit};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

pub use headers::MailSummary;
pub use notifier::{DesktopNotifier, Notifier};
pub use uid_store::UidStore;

pub const NAME: &str = "gmail";

pub const IMAP_HOST: &str = "imap.gmail.com";
pub const IMAP_PORT: u16 = 993;

const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Credentials {
    pub email: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Both the address and the password must be set and non-empty.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let email = settings.gmail_email.as_deref().filter(|e| !e.is_empty())?;
        let password = settings.gmail_password.as_deref().filter(|p| !p.is_empty())?;
        Some(Self::new(email, password))
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// New messages found by one check.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MailBatch {
    pub messages: Vec<MailSummary>,
    /// Highest UID seen, never below the UID the check started from.
    pub highest_uid: u32,
}

/// An authenticated mailbox session.
pub trait Mailbox: Send {
    fn highest_uid(&mut self) -> BguResult<u32>;
    fn fetch_since(&mut self, last_uid: u32) -> BguResult<MailBatch>;
    fn logout(&mut self) -> BguResult<()>;
}

/// Opens authenticated sessions.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, credentials: &Credentials) -> BguResult<Box<dyn Mailbox>>;
}

/// IMAP over TLS to Gmail.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self {
            host: IMAP_HOST.to_string(),
            port: IMAP_PORT,
        }
    }
}

impl Connector for ImapConnector {
    fn connect(&self, credentials: &Credentials) -> BguResult<Box<dyn Mailbox>> {
        let mut session = imap::connect_tls(&self.host, self.port, IO_TIMEOUT)?;
        session.login(&credentials.email, credentials.password())?;
        Ok(Box::new(session))
    }
}

pub struct GmailNotifier<C = ImapConnector, N = DesktopNotifier> {
    credentials: Option<Credentials>,
    interval: Duration,
    store: UidStore,
    connector: C,
    notifier: N,
}

impl GmailNotifier {
    pub fn new(settings: &Settings) -> Self {
        Self::with_parts(
            Credentials::from_settings(settings),
            settings.gmail_check_interval(),
            UidStore::in_data_dir(),
            ImapConnector::default(),
            notifier::desktop(),
        )
    }
}

impl<C: Connector, N: Notifier> GmailNotifier<C, N> {
    pub fn with_parts(
        credentials: Option<Credentials>,
        interval: Duration,
        store: UidStore,
        connector: C,
        notifier: N,
    ) -> Self {
        Self {
            credentials,
            interval,
            store,
            connector,
            notifier,
        }
    }

    fn connect(&self, credentials: &Credentials) -> BguResult<Box<dyn Mailbox>> {
        match self.connector.connect(credentials) {
            Ok(session) => {
                info!("Successfully connected to Gmail for {}", credentials.email);
                Ok(session)
            }
            Err(e) => {
                error!("Failed to connect to Gmail: {}", e);
                Err(e)
            }
        }
    }

    /// Marker from disk, or the inbox's current top so old mail stays quiet.
    fn starting_uid(&self, session: &mut dyn Mailbox) -> u32 {
        if let Some(uid) = self.store.load() {
            info!("Resuming monitoring from cached UID: {}", uid);
            return uid;
        }

        let uid = session.highest_uid().unwrap_or_else(|e| {
            warn!("Error getting highest UID, starting from 0: {}", e);
            0
        });
        self.persist(uid);
        info!(
            "No cached UID, starting monitoring from current highest UID: {}",
            uid
        );
        uid
    }

    fn persist(&self, uid: u32) {
        if let Err(e) = self.store.save(uid) {
            warn!("{}", e);
        }
    }

    /// One poll cycle; returns the UID marker to carry into the next one.
    fn check(
        &self,
        credentials: &Credentials,
        session: &mut Option<Box<dyn Mailbox>>,
        last_uid: u32,
    ) -> u32 {
        if session.is_none() {
            warn!("No Gmail connection available, reconnecting");
            *session = self.connect(credentials).ok();
        }
        let Some(mailbox) = session.as_mut() else {
            return last_uid;
        };

        match mailbox.fetch_since(last_uid) {
            Ok(batch) => self.announce(batch, last_uid),
            Err(e) => {
                error!("Error during email check: {}", e);
                if let Some(mut stale) = session.take() {
                    let _ = stale.logout();
                }
                *session = self.connect(credentials).ok();
                if session.is_some() {
                    info!("Reconnected to Gmail");
                }
                last_uid
            }
        }
    }

    fn announce(&self, batch: MailBatch, last_uid: u32) -> u32 {
        if batch.messages.is_empty() {
            debug!("No new emails found (checking after UID {})", last_uid);
        } else {
            info!("Found {} new email(s)", batch.messages.len());
            for mail in &batch.messages {
                let title = format!("New Email from {}", mail.sender);
                let message = format!("Subject: {}", mail.subject);
                if let Err(e) = self.notifier.notify(&title, &message) {
                    warn!("Failed to show notification: {}", e);
                }
            }
        }

        if batch.highest_uid > last_uid {
            self.persist(batch.highest_uid);
            info!("Updated and saved last_uid to: {}", batch.highest_uid);
            batch.highest_uid
        } else {
            last_uid
        }
    }
}

impl<C: Connector, N: Notifier> WorkUnit for GmailNotifier<C, N> {
    fn run(&self, stop: &StopSignal) -> BguResult<()> {
        let Some(credentials) = &self.credentials else {
            error!(
                "Gmail credentials not configured. \
                 Set BGU_GMAIL_EMAIL and BGU_GMAIL_PASSWORD environment variables."
            );
            info!("For security, use an App Password instead of your main Gmail password.");
            return Ok(());
        };

        info!("Starting Gmail notification service");
        info!("Monitoring: {}", credentials.email);
        info!("Check interval: {:.1}s", self.interval.as_secs_f64());

        let mut first = self.connect(credentials)?;
        let mut last_uid = self.starting_uid(first.as_mut());
        let mut session = Some(first);

        while !stop.is_set() {
            last_uid = self.check(credentials, &mut session, last_uid);
            if stop.wait_timeout(self.interval) {
                break;
            }
        }

        if let Some(mut mailbox) = session {
            match mailbox.logout() {
                Ok(()) => info!("Gmail connection closed"),
                Err(e) => warn!("Error closing Gmail connection: {}", e),
            }
        }
        info!("Gmail notification service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BguError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeServer {
        highest: u32,
        batches: VecDeque<BguResult<MailBatch>>,
        connects: usize,
        logouts: usize,
        refuse_connect: bool,
    }

    #[derive(Clone, Default)]
    struct FakeConnector(Arc<Mutex<FakeServer>>);

    struct FakeMailbox(Arc<Mutex<FakeServer>>);

    impl Mailbox for FakeMailbox {
        fn highest_uid(&mut self) -> BguResult<u32> {
            Ok(self.0.lock().unwrap().highest)
        }

        fn fetch_since(&mut self, last_uid: u32) -> BguResult<MailBatch> {
            self.0
                .lock()
                .unwrap()
                .batches
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(MailBatch {
                        messages: Vec::new(),
                        highest_uid: last_uid,
                    })
                })
        }

        fn logout(&mut self) -> BguResult<()> {
            self.0.lock().unwrap().logouts += 1;
            Ok(())
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self, _credentials: &Credentials) -> BguResult<Box<dyn Mailbox>> {
            let mut server = self.0.lock().unwrap();
            server.connects += 1;
            if server.refuse_connect {
                return Err(BguError::Mail("connection refused".into()));
            }
            Ok(Box::new(FakeMailbox(self.0.clone())))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier(Arc<Mutex<Vec<(String, String)>>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, message: &str) -> BguResult<()> {
            self.0
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn mail(sender: &str, subject: &str) -> MailSummary {
        MailSummary {
            sender: sender.to_string(),
            subject: subject.to_string(),
            timestamp: "Unknown".to_string(),
        }
    }

    fn poller(
        store: UidStore,
        connector: FakeConnector,
        notifier: RecordingNotifier,
    ) -> GmailNotifier<FakeConnector, RecordingNotifier> {
        GmailNotifier::with_parts(
            Some(Credentials::new("me@example.com", "app-password")),
            Duration::from_millis(10),
            store,
            connector,
            notifier,
        )
    }

    #[test]
    fn credentials_need_both_fields() {
        let mut settings = Settings {
            gmail_email: Some("me@example.com".into()),
            ..Settings::default()
        };
        assert!(Credentials::from_settings(&settings).is_none());

        settings.gmail_password = Some(String::new());
        assert!(Credentials::from_settings(&settings).is_none());

        settings.gmail_password = Some("app-password".into());
        let credentials = Credentials::from_settings(&settings).unwrap();
        assert_eq!(credentials.password(), "app-password");
        assert!(!format!("{credentials:?}").contains("app-password"));
    }

    #[test]
    fn missing_credentials_return_without_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        let service = GmailNotifier::with_parts(
            None,
            Duration::from_millis(10),
            UidStore::new(dir.path().join("uid.txt")),
            connector.clone(),
            RecordingNotifier::default(),
        );

        service.run(&StopSignal::new()).unwrap();
        assert_eq!(connector.0.lock().unwrap().connects, 0);
    }

    #[test]
    fn first_run_seeds_marker_with_current_highest() {
        let dir = tempfile::tempdir().unwrap();
        let store = UidStore::new(dir.path().join("uid.txt"));
        let connector = FakeConnector::default();
        connector.0.lock().unwrap().highest = 977;
        let notifier = RecordingNotifier::default();

        let service = poller(store.clone(), connector.clone(), notifier.clone());
        let stop = StopSignal::new();
        stop.set();
        service.run(&stop).unwrap();

        assert_eq!(store.load(), Some(977));
        assert!(notifier.0.lock().unwrap().is_empty());
        assert_eq!(connector.0.lock().unwrap().logouts, 1);
    }

    #[test]
    fn new_mail_is_announced_and_marker_advances() {
        let dir = tempfile::tempdir().unwrap();
        let store = UidStore::new(dir.path().join("uid.txt"));
        store.save(10).unwrap();
        let notifier = RecordingNotifier::default();
        let service = poller(store.clone(), FakeConnector::default(), notifier.clone());

        let mut session: Option<Box<dyn Mailbox>> = Some(Box::new(FakeMailbox(Arc::default())));
        let credentials = Credentials::new("me@example.com", "pw");

        let next = service.announce(
            MailBatch {
                messages: vec![mail("Alice", "Lunch?"), mail("Bob", "Re: Launch")],
                highest_uid: 12,
            },
            10,
        );
        assert_eq!(next, 12);
        assert_eq!(store.load(), Some(12));
        assert_eq!(
            *notifier.0.lock().unwrap(),
            vec![
                ("New Email from Alice".to_string(), "Subject: Lunch?".to_string()),
                ("New Email from Bob".to_string(), "Subject: Re: Launch".to_string()),
            ]
        );

        // An empty batch leaves the marker where it was.
        assert_eq!(service.check(&credentials, &mut session, next), 12);
        assert_eq!(store.load(), Some(12));
    }

    #[test]
    fn check_error_triggers_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        let service = poller(
            UidStore::new(dir.path().join("uid.txt")),
            connector.clone(),
            RecordingNotifier::default(),
        );
        let credentials = Credentials::new("me@example.com", "pw");
        connector
            .0
            .lock()
            .unwrap()
            .batches
            .push_back(Err(BguError::Mail("socket closed".into())));

        let mut session = Some(connector.connect(&credentials).unwrap());
        assert_eq!(service.check(&credentials, &mut session, 5), 5);
        assert!(session.is_some());

        let server = connector.0.lock().unwrap();
        assert_eq!(server.connects, 2);
        assert_eq!(server.logouts, 1);
    }

    #[test]
    fn failed_reconnect_is_retried_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        connector.0.lock().unwrap().refuse_connect = true;
        let service = poller(
            UidStore::new(dir.path().join("uid.txt")),
            connector.clone(),
            RecordingNotifier::default(),
        );
        let credentials = Credentials::new("me@example.com", "pw");

        let mut session = None;
        assert_eq!(service.check(&credentials, &mut session, 5), 5);
        assert!(session.is_none());

        connector.0.lock().unwrap().refuse_connect = false;
        assert_eq!(service.check(&credentials, &mut session, 5), 5);
        assert!(session.is_some());
        assert_eq!(connector.0.lock().unwrap().connects, 2);
    }

    #[test]
    fn initial_connect_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        connector.0.lock().unwrap().refuse_connect = true;
        let service = poller(
            UidStore::new(dir.path().join("uid.txt")),
            connector,
            RecordingNotifier::default(),
        );
        assert!(service.run(&StopSignal::new()).is_err());
    }
}
