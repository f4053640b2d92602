//! Health probe logic

use mailprobe_common::config::ApiConfig;
use serde_json::Value;

use crate::{HealthError, HealthReport, Snapshot, Subsystem};

/// Queries the status endpoints of the service under test
///
/// Endpoints hang off the API origin. Each subsystem is checked on its own; a
/// failure is captured in that subsystem's [`Snapshot`] and never prevents
/// the remaining checks.
#[derive(Debug, Clone)]
pub struct HealthProber {
    http: reqwest::Client,
    base_url: String,
}

impl HealthProber {
    /// Create a prober for the API origin in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check every subsystem, in [`Subsystem::ALL`] order
    pub async fn check_health(&self) -> HealthReport {
        let mut report = HealthReport::default();

        for subsystem in Subsystem::ALL {
            let snapshot = self.check_one(subsystem).await;
            report.subsystems.insert(subsystem, snapshot);
        }

        report
    }

    /// Check a single subsystem
    pub async fn check_one(&self, subsystem: Subsystem) -> Snapshot {
        let url = format!("{}{}", self.base_url, subsystem.path());
        tracing::debug!(%subsystem, %url, "Probing health endpoint");

        let snapshot = match self.fetch(&url).await {
            Ok((status, body)) => evaluate(subsystem, status, &body),
            Err(Failure { status, error }) => Snapshot {
                reachable: status.is_some(),
                healthy: false,
                http_status: status,
                counters: Vec::new(),
                error: Some(error.to_string()),
            },
        };

        if snapshot.healthy {
            tracing::debug!(%subsystem, status = ?snapshot.http_status, "Subsystem healthy");
        } else {
            tracing::warn!(
                %subsystem,
                status = ?snapshot.http_status,
                error = snapshot.error.as_deref().unwrap_or("reported unhealthy"),
                "Subsystem unhealthy"
            );
        }

        let unknown = snapshot.unknown_counters();
        if snapshot.reachable && !unknown.is_empty() {
            tracing::warn!(%subsystem, ?unknown, "Health counters missing");
        }

        snapshot
    }

    async fn fetch(&self, url: &str) -> Result<(u16, Value), Failure> {
        let response = self.http.get(url).send().await.map_err(Failure::transport)?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            return Err(Failure {
                status: Some(status),
                error: HealthError::Status(status),
            });
        }

        let text = response.text().await.map_err(Failure::transport)?;

        // `/health` is allowed to answer with plain text.
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok((status, body))
    }
}

struct Failure {
    status: Option<u16>,
    error: HealthError,
}

impl Failure {
    fn transport(error: reqwest::Error) -> Self {
        Self {
            status: error.status().map(|s| s.as_u16()),
            error: HealthError::Transport(error),
        }
    }
}

/// Turns a 2xx response into a snapshot
fn evaluate(subsystem: Subsystem, status: u16, body: &Value) -> Snapshot {
    let counters = subsystem.extract(body);

    let mut snapshot = Snapshot {
        reachable: true,
        healthy: true,
        http_status: Some(status),
        counters,
        error: None,
    };

    if subsystem != Subsystem::Overall && body.is_null() {
        snapshot.healthy = false;
        snapshot.error =
            Some(HealthError::Malformed("expected a JSON object".to_string()).to_string());
        return snapshot;
    }

    if let Some(flag) = subsystem.health_flag()
        && snapshot.counter(flag).as_bool() == Some(false)
    {
        snapshot.healthy = false;
        snapshot.error = Some(format!("{flag} is false"));
    }

    snapshot
}
