use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use thiserror::Error;

/// Where a verification run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Provisioned,
    Injected,
    Verifying,
    Completed,
    TerminatedEarly,
}

/// What just happened, as far as the run's phase is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    MailboxIssued,
    ProvisioningFailed,
    InjectionFinished,
    PollingStarted,
    PollingFinished,
    Abort,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    #[error("Cannot apply {step:?} while {from}")]
    Illegal { from: Phase, step: Step },
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Idle => "Idle",
            Self::Provisioned => "Provisioned",
            Self::Injected => "Injected",
            Self::Verifying => "Verifying",
            Self::Completed => "Completed",
            Self::TerminatedEarly => "Terminated early",
        })
    }
}

impl Phase {
    /// # Errors
    ///
    /// Returns [`PhaseError::Illegal`] when `step` cannot happen in the
    /// current phase. The phase itself is left untouched.
    pub const fn transition(self, step: Step) -> Result<Self, PhaseError> {
        match (self, step) {
            (Self::Idle, Step::MailboxIssued) => Ok(Self::Provisioned),
            (Self::Idle, Step::ProvisioningFailed) => Ok(Self::TerminatedEarly),
            (Self::Provisioned, Step::InjectionFinished) => Ok(Self::Injected),
            (Self::Injected, Step::PollingStarted) => Ok(Self::Verifying),
            (Self::Verifying, Step::PollingFinished) => Ok(Self::Completed),
            (from, Step::Abort) if !from.is_terminal() => Ok(Self::TerminatedEarly),
            (from, step) => Err(PhaseError::Illegal { from, step }),
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TerminatedEarly)
    }
}
