use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use serde_json::Value;

/// One signal observed on the push channel, in the vocabulary of the
/// service's Socket.IO server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    /// The namespace connection was accepted.
    #[serde(rename = "connect")]
    Connect,

    /// The server is ready to accept subscriptions.
    #[serde(rename = "connectionEstablished")]
    ConnectionEstablished(Value),

    /// A message reached the subscribed mailbox. The payload is opaque.
    #[serde(rename = "newMail")]
    NewMail(Value),

    /// Application-level error event, e.g. a refused subscription.
    #[serde(rename = "error")]
    Error(Value),

    #[serde(rename = "connect_error")]
    ConnectError(String),

    #[serde(rename = "disconnect")]
    Disconnect(String),

    /// Any event outside the known vocabulary.
    #[serde(rename = "other")]
    Other { name: String, data: Value },
}

impl PushEvent {
    /// Maps a Socket.IO event by name.
    #[must_use]
    pub fn from_event(name: String, data: Value) -> Self {
        match name.as_str() {
            "connectionEstablished" => Self::ConnectionEstablished(data),
            "newMail" => Self::NewMail(data),
            "error" => Self::Error(data),
            _ => Self::Other { name, data },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connect => "connect",
            Self::ConnectionEstablished(_) => "connectionEstablished",
            Self::NewMail(_) => "newMail",
            Self::Error(_) => "error",
            Self::ConnectError(_) => "connect_error",
            Self::Disconnect(_) => "disconnect",
            Self::Other { name, .. } => name,
        }
    }

    /// `connect_error`, `disconnect` and `error`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Error(_) | Self::ConnectError(_) | Self::Disconnect(_)
        )
    }

    /// After these no further events can arrive.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectError(_) | Self::Disconnect(_))
    }
}

impl Display for PushEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::ConnectError(reason) | Self::Disconnect(reason) => {
                write!(f, "{}: {reason}", self.name())
            }
            Self::ConnectionEstablished(data)
            | Self::NewMail(data)
            | Self::Error(data)
            | Self::Other { data, .. } => {
                if data.is_null() {
                    f.write_str(self.name())
                } else {
                    write!(f, "{} {data}", self.name())
                }
            }
        }
    }
}
