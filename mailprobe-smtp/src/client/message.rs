//! MIME message assembly for injected test mail.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use mailprobe_common::ContentType;

use super::error::{ClientError, Result};

/// Builds a plain `text/plain` message, or a `multipart/alternative` one when
/// an HTML part is set.
///
/// Bodies are always sent base64 encoded as UTF-8, and a non-ASCII subject is
/// encoded as an RFC 2047 encoded word, so arbitrary user input never needs
/// escaping at the SMTP layer.
///
/// ```
/// use mailprobe_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("test@example.com")
///     .to("abc@127.0.0.1")
///     .subject("Test #1")
///     .text("Hello")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("Subject: Test #1\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    text: String,
    html: Option<String>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Plain text body, also the fallback part of an HTML message.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = body.into();
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Sets the body parts from `body` according to `content_type`. For
    /// [`ContentType::Html`] the HTML part is derived from the text.
    #[must_use]
    pub fn body(self, body: &str, content_type: ContentType) -> Self {
        match content_type {
            ContentType::Plain => self.text(body),
            ContentType::Html => {
                let html = render_html(body);
                self.text(body).html(html)
            }
        }
    }

    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// `Message-ID` value, without the angle brackets.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Assembles the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MessageError`] if the sender or recipient is
    /// missing, or a header value contains a line break.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::MessageError("missing From".to_string()))?;
        let to = self
            .to
            .as_deref()
            .ok_or_else(|| ClientError::MessageError("missing To".to_string()))?;
        let subject = self.subject.as_deref().unwrap_or_default();

        for (name, value) in [("From", from), ("To", to), ("Subject", subject)] {
            if value.contains(['\r', '\n']) {
                return Err(ClientError::MessageError(format!(
                    "{name} header contains a line break"
                )));
            }
        }

        let date = self.date.unwrap_or_else(Utc::now);
        let mut message = String::with_capacity(1024 + self.text.len() * 2);

        push_header(&mut message, "From", from);
        push_header(&mut message, "To", to);
        push_header(&mut message, "Subject", &encode_header(subject));
        push_header(&mut message, "Date", &date.to_rfc2822());
        if let Some(id) = &self.message_id {
            push_header(&mut message, "Message-ID", &format!("<{id}>"));
        }
        push_header(&mut message, "MIME-Version", "1.0");

        match &self.html {
            None => {
                push_part_headers(&mut message, "text/plain");
                message.push_str("\r\n");
                message.push_str(&base64_encode(self.text.as_bytes()));
            }
            Some(html) => {
                let boundary = boundary(date);
                push_header(
                    &mut message,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{boundary}\""),
                );
                message.push_str("\r\n");

                for (mime, content) in [("text/plain", self.text.as_str()), ("text/html", html)] {
                    let _ = write!(message, "--{boundary}\r\n");
                    push_part_headers(&mut message, mime);
                    message.push_str("\r\n");
                    message.push_str(&base64_encode(content.as_bytes()));
                }

                let _ = write!(message, "--{boundary}--\r\n");
            }
        }

        Ok(message)
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    let _ = write!(message, "{name}: {value}\r\n");
}

fn push_part_headers(message: &mut String, mime: &str) {
    push_header(message, "Content-Type", &format!("{mime}; charset=utf-8"));
    push_header(message, "Content-Transfer-Encoding", "base64");
}

fn boundary(date: DateTime<Utc>) -> String {
    format!("=_mailprobe_{}", date.timestamp_nanos_opt().unwrap_or_default())
}

/// Bytes of UTF-8 per encoded-word: 60 base64 characters plus the
/// `=?utf-8?B?` `?=` framing stays within 75.
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 `B` encoding for header values that are not plain ASCII.
///
/// Long values become several encoded-words, split on character boundaries
/// and joined by folding whitespace.
#[must_use]
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let (mut start, mut end) = (0, 0);

    for (i, c) in value.char_indices() {
        let next = i + c.len_utf8();
        if next - start > ENCODED_WORD_BYTES {
            words.push(encoded_word(&value[start..end]));
            start = end;
        }
        end = next;
    }
    words.push(encoded_word(&value[start..end]));

    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    let encoded: String = base64_encode(chunk.as_bytes()).split_whitespace().collect();
    format!("=?utf-8?B?{encoded}?=")
}

/// Minimal HTML rendition of a text body: each line becomes a paragraph.
fn render_html(text: &str) -> String {
    let mut html = String::from("<html><body>\r\n");
    for line in text.lines() {
        let escaped = line
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let _ = write!(html, "<p>{escaped}</p>\r\n");
    }
    html.push_str("</body></html>\r\n");
    html
}

/// Base64 with lines wrapped at 76 characters, each terminated by CRLF.
fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    const LINE: usize = 76;

    let mut result = String::with_capacity(data.len() * 4 / 3 + data.len() / 38 + 4);
    let mut col = 0;

    for chunk in data.chunks(3) {
        let mut buf = [0u8; 3];
        buf[..chunk.len()].copy_from_slice(chunk);

        let sextets = [
            buf[0] >> 2,
            ((buf[0] & 0x03) << 4) | (buf[1] >> 4),
            ((buf[1] & 0x0F) << 2) | (buf[2] >> 6),
            buf[2] & 0x3F,
        ];

        for (i, sextet) in sextets.iter().enumerate() {
            if i <= chunk.len() {
                result.push(char::from(ALPHABET[usize::from(*sextet)]));
            } else {
                result.push('=');
            }
        }

        col += 4;
        if col >= LINE {
            result.push_str("\r\n");
            col = 0;
        }
    }

    if col > 0 {
        result.push_str("\r\n");
    }

    result
}
