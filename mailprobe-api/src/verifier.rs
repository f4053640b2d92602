//! The Delivery Verifier: bounded polling of the retrieval endpoint.

use std::cell::{Cell, RefCell};

use mailprobe_common::{
    Mailbox, PollPolicy, RetrievedMessage, poll_until,
    tracing,
};
use serde::Serialize;
use serde_json::Value;

use crate::{ApiClient, RetrieveError};

/// What the verifier saw for one mailbox.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservedMessages {
    /// Records of the final poll that belong to the polled mailbox.
    pub messages: Vec<RetrievedMessage>,
    pub polls: u32,
    /// Polls that failed and were counted as zero messages.
    pub failed_polls: u32,
    pub elapsed_ms: u64,
    pub reached_expected: bool,
    /// Highest number of records attributed to another mailbox in any poll.
    pub misattributed: usize,
    pub last_error: Option<String>,
}

impl ObservedMessages {
    #[must_use]
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        self.messages
            .iter()
            .map(RetrievedMessage::subject_or_default)
            .collect()
    }
}

/// Records of one poll, split by attribution.
#[derive(Debug, Default)]
struct Sample {
    messages: Vec<RetrievedMessage>,
    misattributed: usize,
}

impl ApiClient {
    /// Polls until `expected` messages are visible for `mailbox` or `policy`
    /// runs out.
    ///
    /// With `expected == 0` exactly one poll is made. A failing poll (status,
    /// transport or envelope) is logged and counts as zero messages; it never
    /// ends the polling early. Records carrying a different `mailboxId` are
    /// excluded and counted as misattributed.
    pub async fn verify(
        &self,
        mailbox: &Mailbox,
        expected: usize,
        policy: &PollPolicy,
    ) -> ObservedMessages {
        let failed = Cell::new(0u32);
        let misattributed = Cell::new(0usize);
        let last_error = RefCell::new(None::<String>);

        let outcome = poll_until(
            policy,
            |attempt| {
                let failed = &failed;
                let misattributed = &misattributed;
                let last_error = &last_error;
                async move {
                    match self.fetch_messages(mailbox).await {
                        Ok(records) => {
                            let sample = attribute(records, mailbox);
                            misattributed.set(misattributed.get().max(sample.misattributed));
                            tracing::debug!(
                                attempt,
                                observed = sample.messages.len(),
                                expected,
                                "Polled mailbox"
                            );
                            sample
                        }
                        Err(e) => {
                            failed.set(failed.get() + 1);
                            tracing::warn!(attempt, error = %e, "Retrieval poll failed");
                            last_error.replace(Some(e.to_string()));
                            Sample::default()
                        }
                    }
                }
            },
            |sample| expected == 0 || sample.messages.len() >= expected,
        )
        .await;

        let misattributed = misattributed.get();
        if misattributed > 0 {
            tracing::warn!(
                misattributed,
                id = %mailbox.id,
                "Retrieval returned records belonging to another mailbox"
            );
        }

        ObservedMessages {
            reached_expected: outcome.value.messages.len() >= expected,
            messages: outcome.value.messages,
            polls: outcome.attempts,
            failed_polls: failed.get(),
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            misattributed,
            last_error: last_error.into_inner(),
        }
    }
}

fn attribute(records: Vec<RetrievedMessage>, mailbox: &Mailbox) -> Sample {
    let (foreign, own): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|record| record.is_misattributed(&mailbox.id));

    Sample {
        messages: own,
        misattributed: foreign.len(),
    }
}

/// Extracts the record list from either the wrapped `{success, data: [...]}`
/// shape or a bare array.
///
/// # Errors
///
/// [`RetrieveError::Rejected`] for `success: false`, otherwise
/// [`RetrieveError::Malformed`] for any other shape.
pub fn parse_envelope(value: &Value) -> Result<Vec<Value>, RetrieveError> {
    match value {
        Value::Array(records) => Ok(records.clone()),
        Value::Object(envelope) => {
            if envelope.get("success").and_then(Value::as_bool) == Some(false) {
                let reason = envelope
                    .get("error")
                    .or_else(|| envelope.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("no reason given");
                return Err(RetrieveError::Rejected(reason.to_string()));
            }

            match envelope.get("data") {
                Some(Value::Array(records)) => Ok(records.clone()),
                Some(other) => Err(RetrieveError::Malformed(format!(
                    "'data' is not a list: {other}"
                ))),
                None => Err(RetrieveError::Malformed("missing 'data'".to_string())),
            }
        }
        other => Err(RetrieveError::Malformed(format!(
            "unexpected response shape: {other}"
        ))),
    }
}

/// Injected subjects that no observed subject contains.
pub fn match_subjects<S: AsRef<str>>(injected: &[S], observed: &[RetrievedMessage]) -> Vec<String> {
    injected
        .iter()
        .map(AsRef::as_ref)
        .filter(|subject| {
            !observed
                .iter()
                .filter_map(|m| m.subject.as_deref())
                .any(|seen| seen.contains(subject))
        })
        .map(ToString::to_string)
        .collect()
}
