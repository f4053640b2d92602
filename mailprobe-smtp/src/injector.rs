//! The Email Injector: one SMTP session per synthetic message.

use std::time::Duration;

use chrono::Utc;
use mailprobe_common::{
    ContentType, InjectedMessage,
    config::{IngestionConfig, SmtpEndpoint},
    tracing,
};
use serde::Serialize;

use crate::{
    client::{MessageBuilder, SmtpSession},
    error::{InjectError, Result},
};

/// Outcome of [`Injector::inject`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectionReport {
    pub attempted: u32,
    /// Messages accepted by the ingestion port, in send order.
    pub delivered: Vec<InjectedMessage>,
    pub failures: Vec<InjectionFailure>,
}

impl InjectionReport {
    /// Number of iterations that completed without error.
    #[must_use]
    pub fn delivered_count(&self) -> u32 {
        u32::try_from(self.delivered.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failures.is_empty() && self.delivered_count() == self.attempted
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        self.delivered.iter().map(|m| m.subject.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionFailure {
    /// 1-based iteration number.
    pub index: u32,
    pub error: String,
}

/// Result of probing whether the ingestion port accepts a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCheck {
    pub domain: String,
    pub address: String,
    pub accepted: bool,
    pub error: Option<String>,
}

pub struct Injector {
    config: IngestionConfig,
}

impl Injector {
    #[must_use]
    pub const fn new(config: IngestionConfig) -> Self {
        Self { config }
    }

    /// Overrides the pause between messages.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.inter_message_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub const fn endpoint(&self) -> &SmtpEndpoint {
        self.config.endpoint()
    }

    /// Sends `count` messages to `recipient`, each in its own session.
    ///
    /// A failed iteration is logged and recorded; it never stops the
    /// iterations after it. With more than one message the sender and subject
    /// carry the 1-based index so every message is distinguishable.
    pub async fn inject(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        count: u32,
        content_type: ContentType,
    ) -> InjectionReport {
        let mut report = InjectionReport {
            attempted: count,
            ..InjectionReport::default()
        };

        let endpoint = self.endpoint();
        tracing::info!(
            endpoint = %endpoint.addr(),
            recipient,
            count,
            "Injecting messages"
        );

        for index in 1..=count {
            if index > 1 && self.config.inter_message_delay_ms > 0 {
                tokio::time::sleep(self.config.inter_message_delay()).await;
            }

            let message = self.compose(recipient, subject, body, index, count, content_type);

            match self.deliver(&message, index).await {
                Ok(()) => {
                    tracing::info!(index, subject = %message.subject, "Message accepted");
                    report.delivered.push(message);
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Message injection failed");
                    report.failures.push(InjectionFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Injects one message to `test{unix_seconds}@{domain}` for every domain
    /// and reports which of them the ingestion port accepted.
    pub async fn check_domains(&self, domains: &[String]) -> Vec<DomainCheck> {
        let mut checks = Vec::with_capacity(domains.len());

        for (i, domain) in domains.iter().enumerate() {
            if i > 0 && self.config.inter_message_delay_ms > 0 {
                tokio::time::sleep(self.config.inter_message_delay()).await;
            }

            let address = format!("test{}@{domain}", Utc::now().timestamp());
            let message = self.compose(
                &address,
                &format!("Domain check for {domain}"),
                &format!("Checking whether {domain} is accepted by the ingestion port."),
                1,
                1,
                ContentType::Plain,
            );

            let result = self.deliver(&message, 1).await;
            match &result {
                Ok(()) => tracing::info!(domain = %domain, "Domain accepted"),
                Err(e) => tracing::warn!(domain = %domain, error = %e, "Domain not accepted"),
            }

            checks.push(DomainCheck {
                domain: domain.clone(),
                address,
                accepted: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        checks
    }

    fn compose(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        index: u32,
        count: u32,
        content_type: ContentType,
    ) -> InjectedMessage {
        let sent_at = Utc::now();

        let (sender, subject, body) = if count > 1 {
            (
                indexed_sender(&self.config.sender, index),
                format!("{subject} #{index}"),
                format!(
                    "{body}\n\nMessage {index}/{count}\nSent at {}\nTo: {recipient}",
                    sent_at.to_rfc3339()
                ),
            )
        } else {
            (self.config.sender.clone(), subject.to_string(), body.to_string())
        };

        InjectedMessage {
            sender,
            recipient: recipient.to_string(),
            subject,
            body,
            content_type,
            sent_at,
        }
    }

    /// Runs one complete session for `message`.
    async fn deliver(&self, message: &InjectedMessage, index: u32) -> Result<()> {
        let data = MessageBuilder::new()
            .from(message.sender.as_str())
            .to(message.recipient.as_str())
            .subject(message.subject.as_str())
            .body(&message.body, message.content_type)
            .date(message.sent_at)
            .message_id(format!(
                "{}.{index}@{}",
                message.sent_at.timestamp_millis(),
                self.config.helo_name
            ))
            .build()?;

        let endpoint = self.endpoint();
        let mut session =
            SmtpSession::connect(&endpoint.host, endpoint.port, self.config.timeouts.clone())
                .await?;

        session.ehlo(&self.config.helo_name).await?;

        if self.config.starttls {
            if !session.supports("STARTTLS") {
                return Err(InjectError::StartTlsUnavailable);
            }
            session.starttls(self.config.accept_invalid_certs).await?;
            session.ehlo(&self.config.helo_name).await?;
        }

        session.mail_from(&message.sender).await?;
        session.rcpt_to(&message.recipient).await?;
        session.data(&data).await?;
        session.quit().await;

        Ok(())
    }
}

/// `local@domain` becomes `local-{index}@domain`.
fn indexed_sender(sender: &str, index: u32) -> String {
    match sender.rsplit_once('@') {
        Some((local, domain)) => format!("{local}-{index}@{domain}"),
        None => format!("{sender}-{index}"),
    }
}
