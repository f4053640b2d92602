//! Health probing of the mail service under test.
//!
//! The service exposes one status endpoint per subsystem:
//!
//! - **`/health`** - overall liveness, healthy iff 2xx
//! - **`/health/mail`** - SMTP listener: `mailService.isRunning`, `mailService.port`
//! - **`/health/websocket`** - push channel: `websocket.connectedClients`,
//!   `websocket.totalSubscriptions`
//! - **`/health/integration`** - mail to push fan-out: `integration.isHealthy`,
//!   `integration.totalMails`, `integration.successfulBroadcasts`,
//!   `integration.failedBroadcasts`, `integration.successRate`
//!
//! Every endpoint is queried independently; a missing counter is reported as
//! [`Field::Unknown`], never defaulted.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mailprobe_common::config::ApiConfig;
//! use mailprobe_health::HealthProber;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = HealthProber::new(&ApiConfig::default())?;
//! let report = prober.check_health().await;
//!
//! for (subsystem, snapshot) in &report.subsystems {
//!     println!("{subsystem}: {}", snapshot.status_label());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod prober;
mod snapshot;

pub use error::HealthError;
pub use prober::HealthProber;
pub use snapshot::{Counter, Field, HealthReport, Snapshot, Subsystem};
