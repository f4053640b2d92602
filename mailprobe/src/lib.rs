//! End-to-end verification of a disposable-mailbox service.
//!
//! A run provisions a mailbox, injects mail over SMTP and reconciles three
//! independent views of the same delivery: SMTP acceptance, the retrieval
//! API and the push channel. See [`Orchestrator::run`].

pub mod orchestrator;
pub mod phase;
pub mod report;
pub mod scenario;

pub use orchestrator::Orchestrator;
pub use phase::{Phase, PhaseError, Step};
pub use report::{RunResult, Verdict, render_health, render_text};
pub use scenario::Scenario;
