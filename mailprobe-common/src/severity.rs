use core::fmt::{self, Display, Formatter};

use serde::Serialize;

/// How much a finding affects the run it was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, does not change the verdict on its own.
    Informational,
    /// One call failed; the run carried on.
    Degraded,
    /// The run could not continue.
    Fatal,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Informational => "info",
            Self::Degraded => "degraded",
            Self::Fatal => "fatal",
        })
    }
}

/// Something noteworthy that happened during a run, tagged with the
/// component that observed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub component: &'static str,
    pub message: String,
}

impl Finding {
    #[must_use]
    pub fn new(severity: Severity, component: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            component,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Informational, component, message)
    }

    #[must_use]
    pub fn degraded(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Degraded, component, message)
    }

    #[must_use]
    pub fn fatal(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, component, message)
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.component, self.message)
    }
}
