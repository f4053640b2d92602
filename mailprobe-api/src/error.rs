//! Error types for the issuance and retrieval endpoints.

use thiserror::Error;

/// Why a mailbox could not be provisioned. Always fatal to a run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Issuance request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("Issuance API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The envelope said `success: false`.
    #[error("Issuance API refused the request: {body}")]
    Rejected { body: String },

    /// The envelope lacked `data` or one of `id`, `address`, `token`.
    #[error("Malformed issuance response: {0}")]
    Malformed(String),
}

/// Why a single retrieval poll produced no messages.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("Retrieval request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Retrieval API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Retrieval API refused the request: {0}")]
    Rejected(String),

    #[error("Malformed retrieval response: {0}")]
    Malformed(String),
}

/// Longest response body kept in an error message.
pub(crate) const BODY_PREVIEW: usize = 200;

pub(crate) fn preview(body: &str) -> String {
    match body.char_indices().nth(BODY_PREVIEW) {
        Some((at, _)) => format!("{}...", &body[..at]),
        None => body.to_string(),
    }
}
