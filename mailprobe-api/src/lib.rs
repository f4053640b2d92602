//! REST side of the harness: mailbox provisioning and delivery verification
//! against the issuance/retrieval API.

mod client;
mod error;
pub mod provisioner;
pub mod verifier;

pub use client::ApiClient;
pub use error::{ProvisionError, RetrieveError};
pub use provisioner::Provisioned;
pub use verifier::{ObservedMessages, match_subjects, parse_envelope};
