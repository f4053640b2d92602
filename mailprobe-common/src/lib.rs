//! Shared building blocks for the mailprobe verification harness.
//!
//! Everything that crosses a component boundary lives here: the mailbox data
//! model, the harness configuration, the polling primitive used by the
//! delivery verifier, finding severities and logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod poll;
pub mod severity;

pub use tracing;

pub use config::HarnessConfig;
pub use error::ConfigError;
pub use mailbox::{ContentType, InjectedMessage, Mailbox, MailboxId, RetrievedMessage};
pub use poll::{Backoff, PollOutcome, PollPolicy, poll_until};
pub use severity::{Finding, Severity};
