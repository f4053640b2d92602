//! Harness configuration.
//!
//! One [`HarnessConfig`] enumerates every external endpoint the harness talks
//! to and the default timeouts; it is loaded once and handed to each
//! component. Every field has a default matching the reference local setup,
//! so an empty RON document `()` is a valid configuration.

pub mod timeouts;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

pub use timeouts::ClientTimeouts;

use crate::{error::ConfigError, poll::PollPolicy};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILPROBE_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "./mailprobe.config.ron";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub push: PushConfig,

    /// Polling policy of the delivery verifier.
    #[serde(default)]
    pub verify: PollPolicy,

    /// Web frontend base URL, printed next to the provisioned mailbox.
    #[serde(default)]
    pub frontend_url: Option<String>,
}

/// Which of the two known ingestion listeners receives injected mail.
///
/// The capture path (a generic SMTP sink) only records traffic; the backend
/// path is the production-like listener that stores mail for the retrieval
/// API and fans it out on the push channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionRoute {
    Capture,
    #[default]
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
}

impl SmtpEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Generic capture sink.
    ///
    /// Default: `localhost:1025`
    #[serde(default = "defaults::capture")]
    pub capture: SmtpEndpoint,

    /// Production-like ingestion listener.
    ///
    /// Default: `localhost:2525`
    #[serde(default = "defaults::backend")]
    pub backend: SmtpEndpoint,

    #[serde(default)]
    pub route: IngestionRoute,

    /// Name sent with EHLO.
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,

    /// Envelope sender. With more than one message per injection the local
    /// part gets an index suffix, e.g. `test-2@example.com`.
    #[serde(default = "defaults::sender")]
    pub sender: String,

    /// Upgrade the session with STARTTLS before the envelope.
    #[serde(default)]
    pub starttls: bool,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: ClientTimeouts,

    /// Pause between two injected messages.
    ///
    /// Default: 0 milliseconds
    #[serde(default)]
    pub inter_message_delay_ms: u64,

    /// Domains exercised by the domain acceptance check.
    #[serde(default = "defaults::candidate_domains")]
    pub candidate_domains: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            capture: defaults::capture(),
            backend: defaults::backend(),
            route: IngestionRoute::default(),
            helo_name: defaults::helo_name(),
            sender: defaults::sender(),
            starttls: false,
            accept_invalid_certs: false,
            timeouts: ClientTimeouts::default(),
            inter_message_delay_ms: 0,
            candidate_domains: defaults::candidate_domains(),
        }
    }
}

impl IngestionConfig {
    /// The endpoint selected by [`IngestionConfig::route`].
    #[must_use]
    pub const fn endpoint(&self) -> &SmtpEndpoint {
        match self.route {
            IngestionRoute::Capture => &self.capture,
            IngestionRoute::Backend => &self.backend,
        }
    }

    #[must_use]
    pub const fn inter_message_delay(&self) -> Duration {
        Duration::from_millis(self.inter_message_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the issuance/retrieval API; health endpoints hang off the
    /// same origin.
    ///
    /// Default: `http://localhost:3001`
    #[serde(default = "defaults::api_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::api_base_url(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Origin of the Socket.IO server (`http`, `https`, `ws` or `wss`).
    ///
    /// Default: `http://localhost:3001`
    #[serde(default = "defaults::push_url")]
    pub url: String,

    /// Budget for the WebSocket handshake and the namespace `connect`.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long to wait for `connectionEstablished` after subscribing.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// How long to wait for `newMail` events after injection.
    ///
    /// Default: 15 seconds
    #[serde(default = "defaults::event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: defaults::push_url(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            confirm_timeout_secs: defaults::confirm_timeout_secs(),
            event_timeout_secs: defaults::event_timeout_secs(),
        }
    }
}

impl PushConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    #[must_use]
    pub const fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }
}

impl HarnessConfig {
    /// Parses a RON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not a valid
    /// configuration, or [`ConfigError::Invalid`] if a value is unusable.
    pub fn from_ron(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration using the following precedence:
    /// 1. `explicit` (the `--config` flag)
    /// 2. the `MAILPROBE_CONFIG` environment variable
    /// 3. `./mailprobe.config.ron`
    /// 4. built-in defaults
    ///
    /// Returns the configuration and the file it came from, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, unreadable or
    /// invalid.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let env = std::env::var(CONFIG_ENV).ok();
        match locate(explicit, env.as_deref())? {
            Some(path) => {
                let content =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                let config = Self::from_ron(&content, &path)?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_scheme(&self.api.base_url, &["http://", "https://"]) {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: format!("'{}' is not an http(s) URL", self.api.base_url),
            });
        }

        if !has_scheme(&self.push.url, &["http://", "https://", "ws://", "wss://"]) {
            return Err(ConfigError::Invalid {
                field: "push.url",
                reason: format!("'{}' is not an http(s) or ws(s) URL", self.push.url),
            });
        }

        if self.verify.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "verify.interval_ms",
                reason: "polling interval must be non-zero".to_string(),
            });
        }

        if !self.ingestion.sender.contains('@') {
            return Err(ConfigError::Invalid {
                field: "ingestion.sender",
                reason: format!("'{}' is not an address", self.ingestion.sender),
            });
        }

        Ok(())
    }
}

/// Resolves which configuration file to read, if any.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when an explicitly named file (flag or
/// environment) does not exist.
pub fn locate(explicit: Option<&Path>, env: Option<&str>) -> Result<Option<PathBuf>, ConfigError> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.map(PathBuf::from));

    if let Some(path) = named {
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }

    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(default.exists().then_some(default))
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes.iter().any(|scheme| url.starts_with(scheme))
}

mod defaults {
    use super::SmtpEndpoint;

    pub fn capture() -> SmtpEndpoint {
        SmtpEndpoint::new("localhost", 1025)
    }

    pub fn backend() -> SmtpEndpoint {
        SmtpEndpoint::new("localhost", 2525)
    }

    pub fn helo_name() -> String {
        "mailprobe.localhost".to_string()
    }

    pub fn sender() -> String {
        "test@example.com".to_string()
    }

    pub fn candidate_domains() -> Vec<String> {
        vec!["127.0.0.1".to_string()]
    }

    pub fn api_base_url() -> String {
        "http://localhost:3001".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        10
    }

    pub fn push_url() -> String {
        "http://localhost:3001".to_string()
    }

    pub const fn connect_timeout_secs() -> u64 {
        10
    }

    pub const fn confirm_timeout_secs() -> u64 {
        5
    }

    pub const fn event_timeout_secs() -> u64 {
        15
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = HarnessConfig::from_ron("()", Path::new("inline")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.ingestion.endpoint().addr(), "localhost:2525");
        assert_eq!(config.api.base_url, "http://localhost:3001");
    }

    #[test]
    fn test_route_selects_endpoint() {
        let config = HarnessConfig::from_ron(
            r#"(ingestion: (route: Capture, capture: (host: "mailhog", port: 1025)))"#,
            Path::new("inline"),
        )
        .unwrap();

        assert_eq!(config.ingestion.route, IngestionRoute::Capture);
        assert_eq!(config.ingestion.endpoint().addr(), "mailhog:1025");
        // Untouched sibling keeps its default.
        assert_eq!(config.ingestion.backend.port, 2525);
    }

    #[test]
    fn test_invalid_api_url_rejected() {
        let err = HarnessConfig::from_ron(r#"(api: (base_url: "localhost:3001"))"#, Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "api.base_url", .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = HarnessConfig::from_ron("(verify: (interval_ms: 0))", Path::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "verify.interval_ms", .. }));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = HarnessConfig::from_ron("(api: ", Path::new("broken.ron")).unwrap_err();
        assert!(err.to_string().contains("broken.ron"));
    }

    #[test]
    fn test_locate_explicit_missing_file() {
        let err = locate(Some(Path::new("/definitely/not/here.ron")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_locate_prefers_explicit_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.ron");
        let env = dir.path().join("env.ron");
        std::fs::write(&explicit, "()").unwrap();
        std::fs::write(&env, "()").unwrap();

        let found = locate(Some(&explicit), env.to_str()).unwrap();
        assert_eq!(found, Some(explicit));

        let found = locate(None, env.to_str()).unwrap();
        assert_eq!(found, Some(env));
    }
}
