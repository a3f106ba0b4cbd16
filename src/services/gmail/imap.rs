//! Minimal blocking IMAP4rev1 client.
//!
//! Covers the handful of commands the mail poller issues: `LOGIN`, `SELECT`,
//! `UID SEARCH`, `UID FETCH` of a header subset, and `LOGOUT`. Responses are
//! read line by line; `{n}` literals are pulled in whole.

use super::headers::MailSummary;
use super::{MailBatch, Mailbox};
use crate::errors::{BguError, BguResult};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const MAX_LITERAL_BYTES: usize = 1024 * 1024;
const HEADER_FIELDS: &str = "BODY.PEEK[HEADER.FIELDS (FROM SUBJECT DATE)]";

pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Open a TLS connection to `host:port` and read the server greeting.
pub fn connect_tls(host: &str, port: u16, timeout: Duration) -> BguResult<ImapSession<TlsStream>> {
    let address = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| BguError::Mail(format!("Could not resolve {host}")))?;
    let socket = TcpStream::connect_timeout(&address, timeout)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| BguError::Mail(format!("Invalid server name {host}: {e}")))?;
    let connection = ClientConnection::new(tls_config()?, server_name)?;
    debug!("TLS connection to {}:{} opened", host, port);
    ImapSession::handshake(StreamOwned::new(connection, socket))
}

fn tls_config() -> BguResult<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(Arc::new(config))
}

/// One server response line, with any literals it carried.
#[derive(Debug, Default, PartialEq, Eq)]
struct ResponseLine {
    text: String,
    literals: Vec<Vec<u8>>,
}

pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn handshake(stream: S) -> BguResult<Self> {
        let mut session = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        if !(greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH")) {
            return Err(BguError::Mail(format!(
                "Unexpected greeting: {}",
                greeting.text
            )));
        }
        Ok(session)
    }

    pub fn login(&mut self, user: &str, password: &str) -> BguResult<()> {
        let command = Zeroizing::new(format!("LOGIN {} {}", quote(user), quote(password)));
        self.command(&command)?;
        Ok(())
    }

    pub fn select_inbox(&mut self) -> BguResult<()> {
        self.command("SELECT INBOX")?;
        Ok(())
    }

    /// UIDs matching `criteria`, e.g. `UID 42:*` or `ALL`.
    pub fn uid_search(&mut self, criteria: &str) -> BguResult<Vec<u32>> {
        let lines = self.command(&format!("UID SEARCH {criteria}"))?;
        Ok(lines
            .iter()
            .filter_map(|line| line.text.strip_prefix("* SEARCH"))
            .flat_map(str::split_whitespace)
            .filter_map(|uid| uid.parse().ok())
            .collect())
    }

    /// Raw `From`/`Subject`/`Date` header block of one message.
    pub fn fetch_headers(&mut self, uid: u32) -> BguResult<Option<Vec<u8>>> {
        let lines = self.command(&format!("UID FETCH {uid} ({HEADER_FIELDS})"))?;
        Ok(lines
            .into_iter()
            .filter(|line| line.text.starts_with("* ") && line.text.contains(" FETCH "))
            .find_map(|line| line.literals.into_iter().next()))
    }

    pub fn logout(&mut self) -> BguResult<()> {
        self.command("LOGOUT")?;
        Ok(())
    }

    /// Send a tagged command and collect untagged lines up to its completion.
    fn command(&mut self, command: &str) -> BguResult<Vec<ResponseLine>> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;
        if !command.starts_with("LOGIN ") {
            debug!("IMAP > {} {}", tag, command);
        }

        let line = Zeroizing::new(format!("{tag} {command}\r\n"));
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.flush()?;

        let completion = format!("{tag} ");
        let mut untagged = Vec::new();
        loop {
            let response = self.read_line()?;
            if !response.text.starts_with(&completion) {
                untagged.push(response);
                continue;
            }
            let status = response.text[completion.len()..].trim_start();
            if status.starts_with("OK") {
                return Ok(untagged);
            }
            return Err(BguError::Mail(format!(
                "{} failed: {}",
                command.split_whitespace().next().unwrap_or(command),
                status
            )));
        }
    }

    fn read_line(&mut self) -> BguResult<ResponseLine> {
        let mut response = ResponseLine::default();
        loop {
            let mut raw = Vec::new();
            if self.stream.read_until(b'\n', &mut raw)? == 0 {
                return Err(BguError::Mail("Connection closed by server".to_string()));
            }
            let segment = String::from_utf8_lossy(&raw);
            let segment = segment.trim_end_matches(['\r', '\n']);
            response.text.push_str(segment);

            match literal_length(segment) {
                Some(len) if len > MAX_LITERAL_BYTES => {
                    return Err(BguError::Mail(format!("Literal of {len} bytes is too large")));
                }
                Some(len) => {
                    let mut literal = vec![0; len];
                    self.stream.read_exact(&mut literal)?;
                    response.literals.push(literal);
                }
                None => return Ok(response),
            }
        }
    }
}

impl<S: Read + Write + Send> Mailbox for ImapSession<S> {
    fn highest_uid(&mut self) -> BguResult<u32> {
        self.select_inbox()?;
        Ok(self.uid_search("ALL")?.into_iter().max().unwrap_or(0))
    }

    fn fetch_since(&mut self, last_uid: u32) -> BguResult<MailBatch> {
        self.select_inbox()?;
        let criteria = format!("UID {}:*", last_uid.saturating_add(1));
        debug!("Searching with criteria: {}", criteria);

        let mut batch = MailBatch {
            messages: Vec::new(),
            highest_uid: last_uid,
        };
        // `n:*` always matches the newest message, even when its UID is below n.
        for uid in self.uid_search(&criteria)? {
            if uid <= last_uid {
                debug!("Skipping UID {} (not above {})", uid, last_uid);
                continue;
            }
            batch.highest_uid = batch.highest_uid.max(uid);
            match self.fetch_headers(uid)? {
                Some(block) => {
                    let summary = MailSummary::from_header_block(&block);
                    debug!("New email UID {} from {}: {}", uid, summary.sender, summary.subject);
                    batch.messages.push(summary);
                }
                None => warn!("No headers returned for UID {}", uid),
            }
        }
        Ok(batch)
    }

    fn logout(&mut self) -> BguResult<()> {
        ImapSession::logout(self)
    }
}

fn literal_length(segment: &str) -> Option<usize> {
    let open = segment.strip_suffix('}')?;
    let start = open.rfind('{')?;
    open[start + 1..].parse().ok()
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Replays canned server output and records what the client sent.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(script: impl Into<Vec<u8>>) -> Self {
            Self {
                input: Cursor::new(script.into()),
                sent: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sent(session: &ImapSession<ScriptedStream>) -> String {
        String::from_utf8_lossy(&session.stream.get_ref().sent).into_owned()
    }

    fn fetch_reply(seq: u32, uid: u32, headers: &str) -> String {
        format!(
            "* {seq} FETCH (UID {uid} BODY[HEADER.FIELDS (FROM SUBJECT DATE)] {{{}}}\r\n{headers})\r\n",
            headers.len()
        )
    }

    #[test]
    fn literal_lengths() {
        assert_eq!(literal_length("* 1 FETCH (BODY[] {42}"), Some(42));
        assert_eq!(literal_length("* OK done"), None);
        assert_eq!(literal_length("{abc}"), None);
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn rejects_unexpected_greeting() {
        let result = ImapSession::handshake(ScriptedStream::new("* BYE go away\r\n"));
        assert!(matches!(result, Err(BguError::Mail(_))));
    }

    #[test]
    fn failed_login_reports_server_status() {
        let mut session = ImapSession::handshake(ScriptedStream::new(
            "* OK Gimap ready\r\nA0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n",
        ))
        .unwrap();
        let err = session.login("me@example.com", "secret").unwrap_err();
        assert!(err.to_string().contains("AUTHENTICATIONFAILED"));
        assert!(!err.to_string().contains("secret"));
        assert!(sent(&session).starts_with("A0001 LOGIN \"me@example.com\" \"secret\"\r\n"));
    }

    #[test]
    fn fetch_since_collects_new_messages() {
        let first = "From: Alice <alice@example.com>\r\nSubject: Lunch?\r\nDate: Mon, 7 Oct 2024 12:00:00 +0000\r\n\r\n";
        let second = "From: =?UTF-8?Q?Bob?= <bob@example.com>\r\nSubject: =?UTF-8?B?UmU6IExhdW5jaA==?=\r\n\r\n";
        let script = [
            "* OK Gimap ready\r\n".to_string(),
            "A0001 OK me@example.com authenticated (Success)\r\n".to_string(),
            "* 12 EXISTS\r\n".to_string(),
            "A0002 OK [READ-WRITE] INBOX selected.\r\n".to_string(),
            "* SEARCH 40 41 42\r\n".to_string(),
            "A0003 OK SEARCH completed (Success)\r\n".to_string(),
            fetch_reply(11, 41, first),
            "A0004 OK Success\r\n".to_string(),
            fetch_reply(12, 42, second),
            "A0005 OK Success\r\n".to_string(),
        ]
        .concat();

        let mut session = ImapSession::handshake(ScriptedStream::new(script)).unwrap();
        session.login("me@example.com", "secret").unwrap();
        let batch = session.fetch_since(40).unwrap();

        assert_eq!(batch.highest_uid, 42);
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].sender, "Alice <alice@example.com>");
        assert_eq!(batch.messages[0].subject, "Lunch?");
        assert_eq!(batch.messages[1].sender, "Bob <bob@example.com>");
        assert_eq!(batch.messages[1].subject, "Re: Launch");
        assert_eq!(batch.messages[1].timestamp, "Unknown");

        let sent = sent(&session);
        assert!(sent.contains("A0003 UID SEARCH UID 41:*\r\n"));
        assert!(sent.contains("A0004 UID FETCH 41 (BODY.PEEK[HEADER.FIELDS (FROM SUBJECT DATE)])\r\n"));
    }

    #[test]
    fn search_star_match_below_marker_is_skipped() {
        let script = "* OK ready\r\n\
A0001 OK [READ-WRITE] INBOX selected.\r\n\
* SEARCH 42\r\n\
A0002 OK SEARCH completed\r\n";
        let mut session = ImapSession::handshake(ScriptedStream::new(script)).unwrap();
        let batch = session.fetch_since(42).unwrap();
        assert!(batch.messages.is_empty());
        assert_eq!(batch.highest_uid, 42);
    }

    #[test]
    fn highest_uid_of_inbox() {
        let script = "* OK ready\r\n\
A0001 OK selected\r\n\
* SEARCH 3 17 9\r\n\
A0002 OK done\r\n";
        let mut session = ImapSession::handshake(ScriptedStream::new(script)).unwrap();
        assert_eq!(session.highest_uid().unwrap(), 17);
    }

    #[test]
    fn closed_connection_is_an_error() {
        let mut session = ImapSession::handshake(ScriptedStream::new("* OK ready\r\n")).unwrap();
        assert!(matches!(session.select_inbox(), Err(BguError::Mail(_))));
    }
}
