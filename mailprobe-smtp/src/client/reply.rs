//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All text lines joined by spaces.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// 2xx
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. `354` after DATA.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Converts a reply outside the expected class into a
    /// [`ClientError::Rejected`] for `step`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] unless the reply is positive, or
    /// intermediate when `intermediate_ok` is set.
    pub fn expect(self, step: &'static str, intermediate_ok: bool) -> Result<Self> {
        if self.is_positive() || (intermediate_ok && self.is_intermediate()) {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                step,
                code: self.code,
                message: self.message(),
            })
        }
    }

    /// Tries to take one complete reply off the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the buffer does not yet hold a final line (`NNN<SP>` or bare `NNN`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] for lines that are not SMTP reply
    /// lines, or when the code changes within one reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = std::str::from_utf8(raw)?;
            let (line_code, last, text) = parse_line(line)?;

            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(ClientError::ParseError(format!(
                        "Reply code changed mid-reply: {expected} then {line_code}"
                    )));
                }
                Some(_) => {}
            }

            lines.push(text.to_string());

            if last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

/// Splits `NNN[- ]text` into code, last-line flag and text.
fn parse_line(line: &str) -> Result<(u16, bool, &str)> {
    let code = line
        .get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| ClientError::ParseError(format!("Not a reply line: '{line}'")))?;

    match line.as_bytes().get(3) {
        None => Ok((code, true, "")),
        Some(b' ') => Ok((code, true, &line[4..])),
        Some(b'-') => Ok((code, false, &line[4..])),
        Some(other) => Err(ClientError::ParseError(format!(
            "Invalid separator '{}' in '{line}'",
            char::from(*other)
        ))),
    }
}
