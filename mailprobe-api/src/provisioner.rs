//! Parsing of the issuance envelope `{success, data: {id, address, token}}`.

use mailprobe_common::Mailbox;
use serde::{Deserialize, Serialize};

use crate::{ProvisionError, error::preview};

/// A freshly issued mailbox plus the identifier format check.
#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub mailbox: Mailbox,
    /// `false` flags a potential identifier-format regression.
    pub id_format_ok: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: Option<bool>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Issued {
    id: serde_json::Value,
    address: String,
    token: String,
}

/// Parses a 2xx issuance body.
///
/// # Errors
///
/// [`ProvisionError::Rejected`] when `success` is `false`, otherwise
/// [`ProvisionError::Malformed`] for anything that does not carry a complete
/// `data` object.
pub(crate) fn parse_issued(body: &str) -> Result<Provisioned, ProvisionError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| ProvisionError::Malformed(format!("{e}: {}", preview(body))))?;

    if envelope.success == Some(false) {
        return Err(ProvisionError::Rejected {
            body: preview(body),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| ProvisionError::Malformed("missing 'data'".to_string()))?;

    let issued: Issued = serde_json::from_value(data)
        .map_err(|e| ProvisionError::Malformed(e.to_string()))?;

    let id = match issued.id {
        serde_json::Value::String(id) => id,
        serde_json::Value::Number(id) => id.to_string(),
        other => {
            return Err(ProvisionError::Malformed(format!(
                "'id' must be a string, got {other}"
            )));
        }
    };

    if id.is_empty() || issued.address.is_empty() || issued.token.is_empty() {
        return Err(ProvisionError::Malformed(
            "empty 'id', 'address' or 'token'".to_string(),
        ));
    }

    let mailbox = Mailbox::new(id, issued.address, issued.token);
    let id_format_ok = mailbox.id.is_object_id();

    Ok(Provisioned {
        mailbox,
        id_format_ok,
    })
}
