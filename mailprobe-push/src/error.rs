use thiserror::Error;

/// Failures of the push transport. The probe records these as findings; they
/// never escape [`PushProbe::subscribe`](crate::PushProbe::subscribe).
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Invalid push URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Socket.IO protocol error: {0}")]
    Protocol(String),

    /// The server refused the namespace connection.
    #[error("Connection refused by server: {0}")]
    ConnectRefused(String),

    #[error("Connection closed: {0}")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, PushError>;
