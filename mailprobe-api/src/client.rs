//! HTTP client for the issuance/retrieval API.

use mailprobe_common::{Mailbox, RetrievedMessage, config::ApiConfig, tracing};

use crate::{
    ProvisionError, RetrieveError,
    error::preview,
    provisioner::{self, Provisioned},
    verifier,
};

/// Thin wrapper over a [`reqwest::Client`] bound to one API origin.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (for example
    /// when no TLS backend is available).
    pub fn new(config: &ApiConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("mailprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Requests a fresh mailbox from `POST /api/mailbox/generate`.
    ///
    /// An identifier that is not a 24 character hex string is reported
    /// through [`Provisioned::id_format_ok`] and a warning, not an error.
    ///
    /// # Errors
    ///
    /// Any transport failure, non-2xx status or malformed envelope. The caller
    /// must treat this as fatal.
    pub async fn provision(&self) -> Result<Provisioned, ProvisionError> {
        let url = self.url("/api/mailbox/generate");
        tracing::debug!(%url, "Requesting mailbox");

        let response = self.http.post(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProvisionError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let provisioned = provisioner::parse_issued(&body)?;
        let mailbox = &provisioned.mailbox;

        tracing::info!(
            id = %mailbox.id,
            address = %mailbox.address,
            token = %mailbox.masked_token(),
            "Mailbox provisioned"
        );

        if !provisioned.id_format_ok {
            tracing::warn!(
                id = %mailbox.id,
                "Mailbox identifier is not a 24 character hex string"
            );
        }

        Ok(provisioned)
    }

    /// One call to `GET /api/mail/{id}` with the mailbox's bearer token.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and envelopes that are neither
    /// the wrapped nor the bare shape.
    pub async fn fetch_messages(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Vec<RetrievedMessage>, RetrieveError> {
        let url = self.url(&format!("/api/mail/{}", mailbox.id));

        let response = self
            .http
            .get(&url)
            .bearer_auth(&mailbox.token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RetrieveError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| RetrieveError::Malformed(format!("{e}: {}", preview(&body))))?;

        let records = verifier::parse_envelope(&value)?;
        Ok(records.into_iter().map(RetrievedMessage::from_raw).collect())
    }
}
