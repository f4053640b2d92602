//! Bounded polling primitive.
//!
//! The delivery verifier (and anything else that waits for an external
//! service to catch up) describes *how* to wait with a [`PollPolicy`] and
//! hands the actual probing to [`poll_until`].

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Growth of the delay between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Backoff {
    /// Every attempt waits `interval`.
    #[default]
    Fixed,

    /// Attempt `n` waits `interval * factor^n`, capped at `max_interval_ms`.
    Exponential { factor: f64, max_interval_ms: u64 },
}

/// How long, and how often, to poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Base delay between two attempts.
    ///
    /// Default: 1000 milliseconds
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,

    /// Hard cap on attempts. `None` leaves only the deadline in charge.
    ///
    /// Default: none
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Total time budget, measured from the first attempt.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::deadline_secs")]
    pub deadline_secs: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: defaults::interval_ms(),
            max_attempts: None,
            deadline_secs: defaults::deadline_secs(),
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn fixed(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval_ms: duration_ms(interval),
            max_attempts: None,
            deadline_secs: deadline.as_secs(),
            backoff: Backoff::Fixed,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Delay to wait after `attempt` (1-based) before the next one.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval(),
            Backoff::Exponential {
                factor,
                max_interval_ms,
            } => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    reason = "Delays are small, positive millisecond counts"
                )]
                let delay_ms = (self.interval_ms as f64 * factor.max(1.0).powi(exponent))
                    .min(max_interval_ms as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }

    /// Whether another attempt may start after `attempts` attempts and
    /// `elapsed` time.
    #[must_use]
    pub fn should_continue(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }

        elapsed < self.deadline()
    }
}

/// Result of a [`poll_until`] run.
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    /// The value produced by the last attempt.
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Whether `done` accepted the last value.
    pub satisfied: bool,
}

/// Calls `probe` until `done` accepts its output or `policy` runs out.
///
/// The first attempt always runs. Sleeps are clipped so the loop never waits
/// past the deadline, and the value of the final attempt is returned even when
/// it did not satisfy `done`.
pub async fn poll_until<T, F, Fut, D>(policy: &PollPolicy, mut probe: F, done: D) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    D: Fn(&T) -> bool,
{
    let start = Instant::now();
    let deadline = policy.deadline();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let value = probe(attempts).await;
        let elapsed = start.elapsed();

        if done(&value) {
            return PollOutcome {
                value,
                attempts,
                elapsed,
                satisfied: true,
            };
        }

        if !policy.should_continue(attempts, elapsed) {
            return PollOutcome {
                value,
                attempts,
                elapsed,
                satisfied: false,
            };
        }

        let remaining = deadline.saturating_sub(elapsed);
        tokio::time::sleep(policy.delay_for(attempts).min(remaining)).await;
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod defaults {
    pub const fn interval_ms() -> u64 {
        1000
    }

    pub const fn deadline_secs() -> u64 {
        10
    }
}
