//! Mailbox data model shared by every component of a verification run.

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of hex characters in an identifier issued by the reference system.
pub const OBJECT_ID_LEN: usize = 24;

/// Characters of the bearer token shown in logs and reports.
const TOKEN_PREVIEW_LEN: usize = 20;

/// Opaque mailbox identifier as issued by the provisioning API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailboxId(String);

impl MailboxId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier matches `^[0-9a-fA-F]{24}$`.
    #[must_use]
    pub fn is_object_id(&self) -> bool {
        self.0.len() == OBJECT_ID_LEN && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl Display for MailboxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A disposable, server-issued recipient identity.
///
/// Never mutated after provisioning; every component receives its own clone.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: MailboxId,
    pub address: String,
    #[serde(serialize_with = "serialize_masked")]
    pub token: String,
}

impl Mailbox {
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: MailboxId::new(id),
            address: address.into(),
            token: token.into(),
        }
    }

    /// The token cut down to a short preview, safe for logs.
    #[must_use]
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("token", &self.masked_token())
            .finish()
    }
}

#[must_use]
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= TOKEN_PREVIEW_LEN {
        return "...".to_string();
    }

    let preview: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
    format!("{preview}...")
}

fn serialize_masked<S: serde::Serializer>(token: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mask_token(token))
}

/// Body flavour of an injected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Plain,
    /// `multipart/alternative` with a plain-text fallback.
    Html,
}

/// Evidence of one SMTP transaction accepted by the ingestion port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectedMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub content_type: ContentType,
    pub sent_at: DateTime<Utc>,
}

/// A message record as returned by the retrieval endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedMessage {
    pub subject: Option<String>,
    pub from: Option<String>,
    /// The `mailboxId` the service attached to the record, if any.
    pub mailbox_id: Option<String>,
    pub raw: serde_json::Value,
}

impl RetrievedMessage {
    /// Extracts the known fields from a raw record. Records that are not JSON
    /// objects keep only their raw shape.
    #[must_use]
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let field = |name: &str| {
            raw.get(name)
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        };

        Self {
            subject: field("subject"),
            from: field("from").or_else(|| sender_from_object(&raw)),
            mailbox_id: field("mailboxId"),
            raw,
        }
    }

    /// Whether the record belongs to a mailbox other than `id`.
    #[must_use]
    pub fn is_misattributed(&self, id: &MailboxId) -> bool {
        self.mailbox_id
            .as_deref()
            .is_some_and(|other| other != id.as_str())
    }

    #[must_use]
    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or("(no subject)")
    }
}

/// Some API versions return `from` as `{ "address": ..., "name": ... }`.
fn sender_from_object(raw: &serde_json::Value) -> Option<String> {
    raw.get("from")?
        .get("address")?
        .as_str()
        .map(ToString::to_string)
}
