//! SMTP client timeout configuration used by the injector.
//!
//! Each step of an injection session gets its own budget so that a stalled
//! ingestion daemon fails one iteration quickly instead of hanging the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side SMTP timeout configuration.
///
/// These are deliberately tighter than the delivery-oriented values an MTA
/// would use: the ingestion port is expected to be local and responsive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Timeout for establishing the TCP connection.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Timeout for the greeting and each envelope command (EHLO, STARTTLS,
    /// MAIL FROM, RCPT TO).
    ///
    /// Default: 15 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Timeout for the DATA command and message transfer.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Timeout for QUIT. A slow QUIT does not fail the injection.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }

    /// Upper bound for one complete session.
    #[must_use]
    pub const fn session(&self) -> Duration {
        Duration::from_secs(
            self.connect_secs + 5 * self.command_secs + self.data_secs + self.quit_secs,
        )
    }
}

mod defaults {
    pub const fn connect_secs() -> u64 {
        10
    }

    pub const fn command_secs() -> u64 {
        15
    }

    pub const fn data_secs() -> u64 {
        30
    }

    pub const fn quit_secs() -> u64 {
        5
    }
}
