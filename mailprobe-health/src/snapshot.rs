//! Health snapshot types

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use serde::{Serialize, Serializer};
use serde_json::Value;

/// The subsystems behind the four health endpoints, in probe order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Overall,
    Mail,
    Websocket,
    Integration,
}

impl Subsystem {
    pub const ALL: [Self; 4] = [Self::Overall, Self::Mail, Self::Websocket, Self::Integration];

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Overall => "/health",
            Self::Mail => "/health/mail",
            Self::Websocket => "/health/websocket",
            Self::Integration => "/health/integration",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Mail => "mail",
            Self::Websocket => "websocket",
            Self::Integration => "integration",
        }
    }

    /// JSON object holding this subsystem's counters
    const fn section(self) -> Option<&'static str> {
        match self {
            Self::Overall => None,
            Self::Mail => Some("mailService"),
            Self::Websocket => Some("websocket"),
            Self::Integration => Some("integration"),
        }
    }

    /// Counters surfaced for this subsystem
    pub(crate) const fn counters(self) -> &'static [&'static str] {
        match self {
            Self::Overall => &[],
            Self::Mail => &["isRunning", "port"],
            Self::Websocket => &["connectedClients", "totalSubscriptions"],
            Self::Integration => &[
                "isHealthy",
                "totalMails",
                "successfulBroadcasts",
                "failedBroadcasts",
                "successRate",
            ],
        }
    }

    /// Counter that, when explicitly `false`, marks the subsystem unhealthy
    pub(crate) const fn health_flag(self) -> Option<&'static str> {
        match self {
            Self::Mail => Some("isRunning"),
            Self::Integration => Some("isHealthy"),
            Self::Overall | Self::Websocket => None,
        }
    }

    /// Extracts the known counters from a response body.
    pub(crate) fn extract(self, body: &Value) -> Vec<Counter> {
        let section = self.section().and_then(|name| body.get(name));

        self.counters()
            .iter()
            .map(|&name| Counter {
                name,
                value: section
                    .and_then(|s| s.get(name))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .into(),
            })
            .collect()
    }
}

impl Display for Subsystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that may be absent from a response
///
/// Absent values are never replaced with a plausible default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    Known(T),
    #[default]
    Unknown,
}

impl<T> Field<T> {
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    #[must_use]
    pub const fn as_known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl Field<Value> {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_known().and_then(Value::as_bool)
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_known().and_then(Value::as_u64)
    }
}

impl Display for Field<Value> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(Value::String(s)) => f.write_str(s),
            Self::Known(value) => write!(f, "{value}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(value) => value.serialize(serializer),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// A named counter from a subsystem's status body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub name: &'static str,
    pub value: Field<Value>,
}

/// State of one subsystem at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// The endpoint answered at all
    pub reachable: bool,

    pub healthy: bool,

    pub http_status: Option<u16>,

    pub counters: Vec<Counter>,

    pub error: Option<String>,
}

impl Snapshot {
    #[must_use]
    pub fn counter(&self, name: &str) -> &Field<Value> {
        const UNKNOWN: &Field<Value> = &Field::Unknown;

        self.counters
            .iter()
            .find(|c| c.name == name)
            .map_or(UNKNOWN, |c| &c.value)
    }

    /// Names of counters the subsystem did not report
    #[must_use]
    pub fn unknown_counters(&self) -> Vec<&'static str> {
        self.counters
            .iter()
            .filter(|c| !c.value.is_known())
            .map(|c| c.name)
            .collect()
    }

    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        match (self.reachable, self.healthy) {
            (false, _) => "unreachable",
            (true, false) => "unhealthy",
            (true, true) => "healthy",
        }
    }
}

/// Snapshots of every probed subsystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub subsystems: BTreeMap<Subsystem, Snapshot>,
}

impl HealthReport {
    #[must_use]
    pub fn get(&self, subsystem: Subsystem) -> Option<&Snapshot> {
        self.subsystems.get(&subsystem)
    }

    #[must_use]
    pub fn all_healthy(&self) -> bool {
        !self.subsystems.is_empty() && self.subsystems.values().all(|s| s.healthy)
    }

    #[must_use]
    pub fn unhealthy(&self) -> Vec<Subsystem> {
        self.subsystems
            .iter()
            .filter(|(_, s)| !s.healthy)
            .map(|(subsystem, _)| *subsystem)
            .collect()
    }
}
