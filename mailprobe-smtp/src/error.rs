use thiserror::Error;

use crate::client::ClientError;

/// Why a single injection iteration did not complete.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The ingestion port answered with a 4xx or 5xx reply.
    #[error("{step} rejected with {code}: {message}")]
    Rejected {
        step: &'static str,
        code: u16,
        message: String,
    },

    /// The session could not be established or broke off.
    #[error("SMTP transport failure: {0}")]
    Transport(ClientError),

    /// STARTTLS was required but not offered.
    #[error("Server does not advertise STARTTLS")]
    StartTlsUnavailable,

    #[error("Could not build message: {0}")]
    Message(String),
}

impl From<ClientError> for InjectError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Rejected {
                step,
                code,
                message,
            } => Self::Rejected {
                step,
                code,
                message,
            },
            ClientError::MessageError(reason) => Self::Message(reason),
            other => Self::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, InjectError>;
