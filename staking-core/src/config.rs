//! Configuration for signing orchestration

use crate::custody::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote signing poll settings
    pub signing: SigningConfig,

    /// Custody backend connection
    pub custody: CustodyConfig,

    /// Target network behaviour
    pub network: NetworkConfig,

    /// Log output
    pub telemetry: TelemetryConfig,
}

/// Remote signing poll settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Interval between status polls (default: 1000ms)
    pub poll_interval_ms: u64,

    /// Overall signing deadline; unset waits indefinitely
    pub timeout_ms: Option<u64>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_ms: None,
        }
    }
}

impl SigningConfig {
    /// Session settings for [`crate::custody::RemoteSigningSession`]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Custody backend connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// API base URL
    pub base_url: String,

    /// Bearer token (should come from env/vault)
    pub api_token: Option<String>,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for CustodyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Target network behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name (used for queue names and logs)
    pub name: String,

    /// Submit broadcasts one at a time, in order
    pub ordered_broadcast: bool,

    /// Nonces are issued locally rather than by the node
    pub caller_managed_nonce: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ordered_broadcast: false,
            caller_managed_nonce: false,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,

    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Config::default();

        if let Some(interval) = var("STAKING_POLL_INTERVAL_MS") {
            config.signing.poll_interval_ms = parse_var("STAKING_POLL_INTERVAL_MS", &interval)?;
        }

        if let Some(timeout) = var("STAKING_SIGNING_TIMEOUT_MS") {
            config.signing.timeout_ms = Some(parse_var("STAKING_SIGNING_TIMEOUT_MS", &timeout)?);
        }

        if let Some(url) = var("STAKING_CUSTODY_URL") {
            config.custody.base_url = url;
        }

        if let Some(token) = var("STAKING_CUSTODY_TOKEN") {
            config.custody.api_token = Some(token);
        }

        if let Some(name) = var("STAKING_NETWORK") {
            config.network.name = name;
        }

        if let Some(ordered) = var("STAKING_ORDERED_BROADCAST") {
            config.network.ordered_broadcast = parse_var("STAKING_ORDERED_BROADCAST", &ordered)?;
        }

        if let Some(managed) = var("STAKING_CALLER_MANAGED_NONCE") {
            config.network.caller_managed_nonce =
                parse_var("STAKING_CALLER_MANAGED_NONCE", &managed)?;
        }

        if let Some(json) = var("STAKING_LOG_JSON") {
            config.telemetry.json = parse_var("STAKING_LOG_JSON", &json)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the poll loop spin or never connect
    pub fn validate(&self) -> crate::Result<()> {
        if self.signing.poll_interval_ms == 0 {
            return Err(crate::Error::Config("signing.poll_interval_ms must be > 0".into()));
        }
        if self.custody.base_url.is_empty() {
            return Err(crate::Error::Config("custody.base_url must be set".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{key}={value:?}: {e}")))
}
