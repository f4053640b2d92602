//! Health probe error types

use thiserror::Error;

/// Why a single health endpoint could not be evaluated
#[derive(Debug, Error)]
pub enum HealthError {
    /// The endpoint could not be reached
    #[error("Health endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status
    #[error("Health endpoint returned HTTP {0}")]
    Status(u16),

    /// The body was not JSON
    #[error("Health endpoint returned a non-JSON body: {0}")]
    Malformed(String),
}
