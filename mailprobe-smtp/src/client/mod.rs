//! SMTP client used to inject mail into the ingestion port.
//!
//! A [`SmtpSession`] drives one transaction at a time; every step is bounded
//! by the configured [`ClientTimeouts`](mailprobe_common::config::ClientTimeouts)
//! and non-positive replies surface as [`ClientError::Rejected`].

mod error;
mod message;
mod reply;
mod session;

pub use error::{ClientError, Result};
pub use message::{MessageBuilder, encode_header};
pub use reply::Reply;
pub use session::{SmtpSession, dot_stuff};
