//! Message header parsing and RFC 2047 encoded-word decoding.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use encoding_rs::{Encoding, UTF_8};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSummary {
    pub sender: String,
    pub subject: String,
    pub timestamp: String,
}

impl MailSummary {
    /// Build a summary from a raw `From`/`Subject`/`Date` header block.
    pub fn from_header_block(raw: &[u8]) -> Self {
        let headers = unfold(&String::from_utf8_lossy(raw));
        let field = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        };

        Self {
            sender: decode_words(field("From").unwrap_or_default()),
            subject: decode_words(field("Subject").unwrap_or("No Subject")),
            timestamp: field("Date")
                .map(str::trim)
                .filter(|date| !date.is_empty())
                .unwrap_or("Unknown")
                .to_string(),
        }
    }
}

/// Split a header block into `(name, value)` pairs, joining folded lines.
fn unfold(block: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

/// Decode every `=?charset?B|Q?text?=` word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Malformed words
/// are kept verbatim.
pub fn decode_words(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        match parse_encoded_word(candidate) {
            Some((decoded, consumed)) => {
                if !(after_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&decoded);
                rest = &candidate[consumed..];
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Returns the decoded text and the number of bytes of `word` consumed.
fn parse_encoded_word(word: &str) -> Option<(String, usize)> {
    let body = word.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let text = &body[..end];
    if charset.is_empty() || text.contains([' ', '\t']) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => BASE64_STANDARD.decode(text).ok()?,
        "Q" | "q" => decode_q(text)?,
        _ => return None,
    };
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = text.get(index + 1..index + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                index += 2;
            }
            other => out.push(other),
        }
        index += 1;
    }
    Some(out)
}

/// Decode with the declared charset; unknown labels are read as UTF-8.
/// Malformed sequences become U+FFFD either way.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: `utf-8*en`
    let charset = charset.split('*').next().unwrap_or(charset);
    let encoding = Encoding::for_label(charset.trim().as_bytes()).unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}
