//! SMTP side of the harness: a small ESMTP client and the Email Injector
//! built on it.

pub mod client;
pub mod error;
pub mod injector;

pub use error::InjectError;
pub use injector::{DomainCheck, InjectionFailure, InjectionReport, Injector};
