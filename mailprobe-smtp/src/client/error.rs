//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur during an SMTP session with the ingestion port.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A session step did not complete in time.
    #[error("Timed out during {step} after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    /// Failed to parse an SMTP reply from the server.
    #[error("Failed to parse SMTP reply: {0}")]
    ParseError(String),

    /// The server answered a step with a 4xx or 5xx reply.
    #[error("{step} rejected: {code} {message}")]
    Rejected {
        step: &'static str,
        code: u16,
        message: String,
    },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The message could not be assembled.
    #[error("Invalid message: {0}")]
    MessageError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// The SMTP reply code carried by a rejection.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
