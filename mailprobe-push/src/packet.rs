//! Engine.IO v4 / Socket.IO v5 text packets, default namespace only.
//!
//! Every WebSocket text frame carries one Engine.IO packet; Engine.IO
//! `message` packets (`4`) carry one Socket.IO packet:
//!
//! | frame             | meaning                          |
//! |-------------------|----------------------------------|
//! | `0{"sid":..}`     | Engine.IO open handshake         |
//! | `1`               | Engine.IO close                  |
//! | `2` / `3`         | ping / pong                      |
//! | `40` / `40{..}`   | Socket.IO namespace connect      |
//! | `41`              | Socket.IO namespace disconnect   |
//! | `42["name",data]` | Socket.IO event                  |
//! | `44{..}`          | Socket.IO connect error          |

use serde_json::Value;

use crate::PushError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
    /// Socket.IO packets the probe has no use for (acks, binary events).
    Ignored(char),
}

impl Packet {
    /// Builds an event packet for the default namespace.
    #[must_use]
    pub fn event(name: &str, data: Value) -> Self {
        Self::Event {
            name: name.to_string(),
            data,
        }
    }

    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Protocol`] for empty frames, unknown packet types
    /// and unparseable payloads.
    pub fn decode(frame: &str) -> Result<Self, PushError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| PushError::Protocol("empty frame".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(parse_json(rest)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '6' => Ok(Self::Noop),
            '4' => decode_socket(rest),
            other => Err(PushError::Protocol(format!(
                "unknown Engine.IO packet type '{other}'"
            ))),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(data) => format!("0{data}"),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Connect(None) => "40".to_string(),
            Self::Connect(Some(data)) => format!("40{data}"),
            Self::Disconnect => "41".to_string(),
            Self::Event { name, data } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            Self::ConnectError(data) => format!("44{data}"),
            Self::Ignored(kind) => format!("4{kind}"),
        }
    }
}

fn decode_socket(packet: &str) -> Result<Packet, PushError> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PushError::Protocol("empty Socket.IO packet".to_string()))?;
    let body = strip_namespace_and_ack(chars.as_str());

    match kind {
        '0' if body.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(parse_json(body)?))),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let mut items = match parse_json(body)? {
                Value::Array(items) => items.into_iter(),
                other => {
                    return Err(PushError::Protocol(format!(
                        "event payload is not an array: {other}"
                    )));
                }
            };

            let name = match items.next() {
                Some(Value::String(name)) => name,
                other => {
                    return Err(PushError::Protocol(format!(
                        "event without a name: {other:?}"
                    )));
                }
            };

            Ok(Packet::Event {
                name,
                data: items.next().unwrap_or(Value::Null),
            })
        }
        '4' => Ok(Packet::ConnectError(if body.is_empty() {
            Value::Null
        } else {
            parse_json(body)?
        })),
        '3' | '5' | '6' => Ok(Packet::Ignored(kind)),
        other => Err(PushError::Protocol(format!(
            "unknown Socket.IO packet type '{other}'"
        ))),
    }
}

/// Drops a `/namespace,` prefix and a numeric ack id.
fn strip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    };

    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json(text: &str) -> Result<Value, PushError> {
    serde_json::from_str(text)
        .map_err(|e| PushError::Protocol(format!("invalid packet payload '{text}': {e}")))
}
