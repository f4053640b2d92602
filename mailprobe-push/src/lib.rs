//! Realtime side of the harness: a minimal Socket.IO client over WebSocket
//! and the Push Verification Probe built on it.
//!
//! The probe must subscribe *before* mail is injected; the server does not
//! replay notifications for late subscribers. [`PushProbe::subscribe`]
//! returns a live [`PushSession`] whose background reader keeps the socket
//! answered while the caller injects, and [`PushSession::collect`] gathers
//! the notifications afterwards.

mod error;
mod event;
pub mod packet;
mod probe;

pub use error::{PushError, Result};
pub use event::PushEvent;
pub use probe::{PushOutcome, PushProbe, PushSession, socket_url};
