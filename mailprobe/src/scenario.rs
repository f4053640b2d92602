use std::time::Duration;

use mailprobe_common::{ContentType, HarnessConfig, PollPolicy};

pub const DEFAULT_SUBJECT: &str = "Test Email";

pub const DEFAULT_BODY: &str = "This is a test email for verifying the disposable mailbox.";

/// Parameters of one orchestrated run.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Messages to inject. Zero still provisions and polls once.
    pub count: u32,

    /// Base subject; with more than one message each gets a ` #{i}` suffix.
    pub subject: String,

    pub body: String,

    pub content_type: ContentType,

    /// Pause between two injected messages.
    pub delay: Duration,

    pub poll: PollPolicy,

    /// Subscribe to the push channel before injecting.
    pub push: bool,

    /// How long to wait for `newMail` events once injection is done.
    pub push_timeout: Duration,

    /// Probe the health endpoints before the run and the integration
    /// endpoint after it.
    pub health: bool,
}

impl Scenario {
    /// A single plain message with the configured timings.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            count: 1,
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            content_type: ContentType::Plain,
            delay: config.ingestion.inter_message_delay(),
            poll: config.verify.clone(),
            push: false,
            push_timeout: config.push.event_timeout(),
            health: true,
        }
    }

    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>, content_type: ContentType) -> Self {
        self.body = body.into();
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub const fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub const fn with_health(mut self, health: bool) -> Self {
        self.health = health;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Replaces the poll interval and/or deadline, keeping the rest of the
    /// configured policy.
    #[must_use]
    pub const fn with_poll_timing(
        mut self,
        interval_ms: Option<u64>,
        deadline_secs: Option<u64>,
    ) -> Self {
        if let Some(interval_ms) = interval_ms {
            self.poll.interval_ms = interval_ms;
        }
        if let Some(deadline_secs) = deadline_secs {
            self.poll.deadline_secs = deadline_secs;
        }
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use mailprobe_common::poll::Backoff;

    use super::*;

    #[test]
    fn test_from_config_takes_timings() {
        let mut config = HarnessConfig::default();
        config.ingestion.inter_message_delay_ms = 250;
        config.push.event_timeout_secs = 7;

        let scenario = Scenario::from_config(&config);
        assert_eq!(scenario.count, 1);
        assert_eq!(scenario.delay, Duration::from_millis(250));
        assert_eq!(scenario.push_timeout, Duration::from_secs(7));
        assert_eq!(scenario.poll, config.verify);
        assert!(scenario.health);
        assert!(!scenario.push);
    }

    #[test]
    fn test_poll_timing_keeps_configured_backoff() {
        let mut config = HarnessConfig::default();
        config.verify.max_attempts = Some(4);
        config.verify.backoff = Backoff::Exponential {
            factor: 2.0,
            max_interval_ms: 5000,
        };

        let scenario = Scenario::from_config(&config).with_poll_timing(Some(250), None);
        assert_eq!(scenario.poll.interval_ms, 250);
        assert_eq!(scenario.poll.deadline_secs, config.verify.deadline_secs);
        assert_eq!(scenario.poll.max_attempts, Some(4));
        assert_eq!(scenario.poll.backoff, config.verify.backoff);

        let scenario = Scenario::from_config(&config).with_poll_timing(None, Some(30));
        assert_eq!(scenario.poll.interval_ms, config.verify.interval_ms);
        assert_eq!(scenario.poll.deadline_secs, 30);
        assert_eq!(scenario.poll.max_attempts, Some(4));
    }
}
