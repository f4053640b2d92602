//! Sequences one verification run.
//!
//! health (advisory) → provision → push subscribe → inject → poll-verify →
//! push collect → integration re-check (advisory) → verdict
//!
//! Only provisioning is fatal. Every other component hands back a structured
//! outcome whose failures become [`Finding`]s on the [`RunResult`].

use mailprobe_api::{ApiClient, match_subjects};
use mailprobe_common::{Finding, HarnessConfig, Mailbox, phase};
use mailprobe_health::{HealthProber, HealthReport, Subsystem};
use mailprobe_push::{PushProbe, PushSession};
use mailprobe_smtp::{InjectionReport, Injector};

use crate::{
    phase::{Phase, Step},
    report::RunResult,
    scenario::Scenario,
};

pub struct Orchestrator {
    config: HarnessConfig,
    api: ApiClient,
    health: HealthProber,
    push: PushProbe,
}

impl Orchestrator {
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed.
    pub fn new(config: HarnessConfig) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.api)?;
        let health = HealthProber::new(&config.api)?;
        let push = PushProbe::new(config.push.clone());

        Ok(Self {
            config,
            api,
            health,
            push,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self, scenario: &Scenario) -> RunResult {
        let mut result = RunResult::new(scenario.count, scenario.push);

        if scenario.health {
            phase!("Checking service health");
            let report = self.health.check_health().await;
            record_health(&mut result, &report);
            result.health_before = Some(report);
        }

        phase!("Provisioning mailbox");
        let mailbox = match self.api.provision().await {
            Ok(provisioned) => {
                advance(&mut result, Step::MailboxIssued);
                result.mailbox_created = true;
                result.id_format_ok = Some(provisioned.id_format_ok);
                if !provisioned.id_format_ok {
                    result.findings.push(Finding::info(
                        "provisioner",
                        format!(
                            "Identifier '{}' is not a 24 character hex string",
                            provisioned.mailbox.id
                        ),
                    ));
                }
                result.frontend_link = self.frontend_link(&provisioned.mailbox);
                result.mailbox = Some(provisioned.mailbox.clone());
                provisioned.mailbox
            }
            Err(e) => {
                tracing::error!(error = %e, "Provisioning failed, terminating run");
                result.findings.push(Finding::fatal("provisioner", e.to_string()));
                advance(&mut result, Step::ProvisioningFailed);
                return finish(result);
            }
        };

        // Notifications are not replayed, so the subscription has to be live
        // before the first message goes out.
        let session = if scenario.push {
            phase!("Subscribing to push channel for {}", mailbox.id);
            Some(self.push.subscribe(&mailbox).await)
        } else {
            None
        };

        phase!(
            "Injecting {} message(s) via {}",
            scenario.count,
            self.config.ingestion.endpoint().addr()
        );
        let injection = Injector::new(self.config.ingestion.clone())
            .with_delay(scenario.delay)
            .inject(
                &mailbox.address,
                &scenario.subject,
                &scenario.body,
                scenario.count,
                scenario.content_type,
            )
            .await;
        record_injection(&mut result, &injection);
        advance(&mut result, Step::InjectionFinished);

        let delivered = injection.delivered.len();

        phase!("Verifying delivery of {delivered} message(s)");
        advance(&mut result, Step::PollingStarted);
        let observed = self.api.verify(&mailbox, delivered, &scenario.poll).await;

        result.messages_observed_count = observed.count();
        result.observed_subjects = observed
            .messages
            .iter()
            .map(|m| m.subject_or_default().to_string())
            .collect();
        result.missing_subjects = match_subjects(&injection.subjects(), &observed.messages);
        result.misattributed = observed.misattributed;
        result.polls = observed.polls;
        result.poll_elapsed_ms = observed.elapsed_ms;

        if observed.failed_polls > 0 {
            result.findings.push(Finding::degraded(
                "verifier",
                format!(
                    "{} of {} polls failed, last error: {}",
                    observed.failed_polls,
                    observed.polls,
                    observed.last_error.as_deref().unwrap_or("unknown")
                ),
            ));
        }
        if !observed.reached_expected {
            result.findings.push(Finding::degraded(
                "verifier",
                format!(
                    "Observed {} of {delivered} message(s) within {} ms",
                    observed.count(),
                    observed.elapsed_ms
                ),
            ));
        }
        if observed.misattributed > 0 {
            result.findings.push(Finding::degraded(
                "verifier",
                format!(
                    "{} record(s) belonged to another mailbox",
                    observed.misattributed
                ),
            ));
        }
        for subject in &result.missing_subjects {
            result.findings.push(Finding::degraded(
                "verifier",
                format!("Injected subject '{subject}' was never observed"),
            ));
        }
        advance(&mut result, Step::PollingFinished);

        if let Some(session) = session {
            phase!("Collecting push notifications");
            collect_push(&mut result, session, delivered, scenario).await;
        }

        if scenario.health {
            phase!("Re-checking integration health");
            let snapshot = self.health.check_one(Subsystem::Integration).await;
            if !snapshot.healthy {
                result.findings.push(Finding::degraded(
                    "health",
                    format!(
                        "integration is {} after the run: {}",
                        snapshot.status_label(),
                        snapshot.error.as_deref().unwrap_or("reported unhealthy")
                    ),
                ));
            }
            result.integration_after = Some(snapshot);
        }

        finish(result)
    }

    fn frontend_link(&self, mailbox: &Mailbox) -> Option<String> {
        self.config
            .frontend_url
            .as_deref()
            .map(|url| format!("{}/mailbox/{}", url.trim_end_matches('/'), mailbox.id))
    }
}

fn advance(result: &mut RunResult, step: Step) {
    match result.phase.transition(step) {
        Ok(next) => {
            tracing::debug!(from = %result.phase, to = %next, "Phase transition");
            result.phase = next;
        }
        Err(e) => {
            tracing::error!(error = %e, "Run left its phase sequence");
            result.findings.push(Finding::fatal("orchestrator", e.to_string()));
            result.phase = Phase::TerminatedEarly;
        }
    }
}

fn finish(mut result: RunResult) -> RunResult {
    result.verdict = result.evaluate();
    phase!("Run finished: {}", result.verdict);
    result
}

fn record_health(result: &mut RunResult, report: &HealthReport) {
    for (subsystem, snapshot) in &report.subsystems {
        if !snapshot.healthy {
            result.findings.push(Finding::degraded(
                "health",
                format!(
                    "{subsystem} is {}: {}",
                    snapshot.status_label(),
                    snapshot.error.as_deref().unwrap_or("reported unhealthy")
                ),
            ));
        }

        let unknown = snapshot.unknown_counters();
        if snapshot.reachable && !unknown.is_empty() {
            result.findings.push(Finding::info(
                "health",
                format!("{subsystem} did not report {}", unknown.join(", ")),
            ));
        }
    }
}

fn record_injection(result: &mut RunResult, injection: &InjectionReport) {
    result.messages_sent_count = injection.delivered_count();
    result.messages_sent = injection.attempted > 0 && injection.all_delivered();

    for failure in &injection.failures {
        result.findings.push(Finding::degraded(
            "injector",
            format!("Message {} failed: {}", failure.index, failure.error),
        ));
    }
}

async fn collect_push(
    result: &mut RunResult,
    session: PushSession,
    delivered: usize,
    scenario: &Scenario,
) {
    let outcome = session.collect(delivered, scenario.push_timeout).await;

    result.push_connected = outcome.connected;
    result.push_confirmed = outcome.confirmed;
    result.push_events_received = outcome.notifications;
    result.push_succeeded = outcome.succeeded();

    for failure in &outcome.failures {
        result.findings.push(Finding::degraded("push", failure.clone()));
    }
    if outcome.connected && !outcome.confirmed {
        result.findings.push(Finding::info(
            "push",
            "No connectionEstablished confirmation was received",
        ));
    }
    if delivered > 0 && outcome.notifications < delivered {
        result.findings.push(Finding::degraded(
            "push",
            format!(
                "Received {} of {delivered} newMail event(s) within {:?}",
                outcome.notifications, scenario.push_timeout
            ),
        ));
    }

    result.push_events = outcome.events;
}
