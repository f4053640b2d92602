//! Run results and their rendering.
//!
//! The text form is what an operator reads at the end of a run; the JSON form
//! is the same [`RunResult`] serialized for CI.

use std::fmt::{self, Display, Formatter, Write};

use mailprobe_common::{Finding, Mailbox, Severity};
use mailprobe_health::{HealthReport, Snapshot, Subsystem};
use mailprobe_push::PushEvent;
use serde::Serialize;

use crate::phase::Phase;

const RULE: &str = "==================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Partial,
    Failed,
    TerminatedEarly,
}

impl Verdict {
    /// Process exit code for this verdict.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Passed => 0,
            Self::Partial | Self::Failed => 1,
            Self::TerminatedEarly => 2,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::TerminatedEarly => "TERMINATED EARLY",
        })
    }
}

/// Everything one run established, assembled by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub phase: Phase,
    pub verdict: Verdict,

    /// Token masked on serialization.
    pub mailbox: Option<Mailbox>,
    pub mailbox_created: bool,
    /// `None` until a mailbox was issued.
    pub id_format_ok: Option<bool>,
    pub frontend_link: Option<String>,

    pub messages_expected: u32,
    pub messages_sent: bool,
    pub messages_sent_count: u32,
    pub messages_observed_count: usize,
    pub observed_subjects: Vec<String>,
    /// Injected subjects that never showed up in the mailbox.
    pub missing_subjects: Vec<String>,
    pub misattributed: usize,
    pub polls: u32,
    pub poll_elapsed_ms: u64,

    pub push_requested: bool,
    pub push_connected: bool,
    pub push_confirmed: bool,
    /// `newMail` events only.
    pub push_events_received: usize,
    pub push_succeeded: bool,
    pub push_events: Vec<PushEvent>,

    pub health_before: Option<HealthReport>,
    pub integration_after: Option<Snapshot>,

    pub findings: Vec<Finding>,
}

impl RunResult {
    #[must_use]
    pub const fn new(expected: u32, push_requested: bool) -> Self {
        Self {
            phase: Phase::Idle,
            verdict: Verdict::Failed,
            mailbox: None,
            mailbox_created: false,
            id_format_ok: None,
            frontend_link: None,
            messages_expected: expected,
            messages_sent: false,
            messages_sent_count: 0,
            messages_observed_count: 0,
            observed_subjects: Vec::new(),
            missing_subjects: Vec::new(),
            misattributed: 0,
            polls: 0,
            poll_elapsed_ms: 0,
            push_requested,
            push_connected: false,
            push_confirmed: false,
            push_events_received: 0,
            push_succeeded: false,
            push_events: Vec::new(),
            health_before: None,
            integration_after: None,
            findings: Vec::new(),
        }
    }

    /// Decides the verdict from the evidence gathered so far.
    ///
    /// A run passes only when every view agrees: all messages accepted, all
    /// of them retrievable with their subjects, nothing from another mailbox,
    /// and (if requested) a `newMail` on the push channel. With nothing to
    /// inject the push channel only has to connect.
    #[must_use]
    pub fn evaluate(&self) -> Verdict {
        if self.phase == Phase::TerminatedEarly || !self.mailbox_created {
            return Verdict::TerminatedEarly;
        }

        let expected = self.messages_expected;
        let push_ok = !self.push_requested
            || if expected == 0 {
                self.push_connected
            } else {
                self.push_succeeded
            };

        let passed = self.messages_sent_count == expected
            && self.messages_observed_count == expected as usize
            && self.misattributed == 0
            && self.missing_subjects.is_empty()
            && push_ok;

        if passed {
            return Verdict::Passed;
        }

        let some_evidence = self.messages_sent_count > 0
            && (self.messages_observed_count > 0 || self.push_events_received > 0);

        if some_evidence {
            Verdict::Partial
        } else {
            Verdict::Failed
        }
    }

    #[must_use]
    pub fn findings_at(&self, severity: Severity) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// The summary block printed after the progress log.
#[must_use]
pub fn render_text(result: &RunResult) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_summary(&mut out, result);
    out
}

fn write_summary(out: &mut String, result: &RunResult) -> fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "Run summary ({})", result.phase)?;
    writeln!(out, "{RULE}")?;

    match &result.mailbox {
        Some(mailbox) => {
            writeln!(out, "Mailbox created:      yes")?;
            writeln!(out, "  id:                 {}", mailbox.id)?;
            writeln!(out, "  address:            {}", mailbox.address)?;
            writeln!(out, "  token:              {}", mailbox.masked_token())?;
            if result.id_format_ok == Some(false) {
                writeln!(out, "  id format:          unexpected (not 24 hex characters)")?;
            }
        }
        None => writeln!(out, "Mailbox created:      no")?,
    }

    if let Some(link) = &result.frontend_link {
        writeln!(out, "  frontend:           {link}")?;
    }

    writeln!(
        out,
        "Messages sent:        {}/{}",
        result.messages_sent_count, result.messages_expected
    )?;
    writeln!(
        out,
        "Messages observed:    {} ({} polls, {} ms)",
        result.messages_observed_count, result.polls, result.poll_elapsed_ms
    )?;
    for subject in &result.observed_subjects {
        writeln!(out, "  - {subject}")?;
    }
    if !result.missing_subjects.is_empty() {
        writeln!(out, "  missing: {}", result.missing_subjects.join(", "))?;
    }
    if result.misattributed > 0 {
        writeln!(
            out,
            "  {} record(s) belonged to another mailbox",
            result.misattributed
        )?;
    }

    if result.push_requested {
        writeln!(
            out,
            "Push connected:       {} (confirmed: {})",
            yes_no(result.push_connected),
            yes_no(result.push_confirmed)
        )?;
        writeln!(out, "Push events received: {}", result.push_events_received)?;
    } else {
        writeln!(out, "Push connected:       not probed")?;
    }

    if let Some(integration) = &result.integration_after {
        writeln!(out, "Integration after:    {}", integration.status_label())?;
        for counter in &integration.counters {
            writeln!(out, "  {}: {}", counter.name, counter.value)?;
        }
    }

    if !result.findings.is_empty() {
        writeln!(out, "Findings:")?;
        for finding in &result.findings {
            writeln!(out, "  {finding}")?;
        }
    }

    writeln!(out, "{RULE}")?;
    writeln!(out, "Verdict: {}", result.verdict)
}

/// One block per subsystem with its counters.
#[must_use]
pub fn render_health(report: &HealthReport) -> String {
    let mut out = String::new();

    for subsystem in Subsystem::ALL {
        let Some(snapshot) = report.get(subsystem) else {
            continue;
        };

        let status = snapshot
            .http_status
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let _ = writeln!(
            out,
            "{:<12} {:<12} HTTP {status}",
            subsystem.name(),
            snapshot.status_label()
        );

        for counter in &snapshot.counters {
            let _ = writeln!(out, "  {}: {}", counter.name, counter.value);
        }
        if let Some(error) = &snapshot.error {
            let _ = writeln!(out, "  error: {error}");
        }
    }

    out
}
