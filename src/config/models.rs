// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("backend_addresses must contain at least one backend")]
    NoBackends,

    #[error("invalid backend address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("duplicate backend address {0:?}")]
    DuplicateAddress(String),

    #[error("per_attempt_timeout_secs must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("retry_downtime_secs must not exceed {max}, got {secs}")]
    InvalidDowntime { secs: u64, max: u64 },

    #[error("invalid retry settings: {0}")]
    InvalidRetry(String),
}

/// Upper bound for a quarantine; keeps `Instant` arithmetic from overflowing.
pub const MAX_RETRY_DOWNTIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    pub backend_addresses: Vec<String>,

    /// Quarantine duration after a backend failure.
    #[serde(default = "default_retry_downtime_secs")]
    pub retry_downtime_secs: u64,

    /// Maximum wait for a single backend attempt.
    #[serde(default = "default_per_attempt_timeout_secs")]
    pub per_attempt_timeout_secs: f64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn new(backend_addresses: Vec<String>) -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend_addresses,
            retry_downtime_secs: default_retry_downtime_secs(),
            per_attempt_timeout_secs: default_per_attempt_timeout_secs(),
            retry: RetryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn retry_downtime(&self) -> Result<Duration, ConfigError> {
        let downtime = Duration::from_secs(self.retry_downtime_secs);
        if downtime > MAX_RETRY_DOWNTIME {
            return Err(ConfigError::InvalidDowntime {
                secs: self.retry_downtime_secs,
                max: MAX_RETRY_DOWNTIME.as_secs(),
            });
        }
        Ok(downtime)
    }

    pub fn attempt_timeout(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f64(self.per_attempt_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(ConfigError::InvalidTimeout(self.per_attempt_timeout_secs)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_addresses.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        check_backend_addresses(&self.backend_addresses)?;
        self.attempt_timeout()?;
        self.retry_downtime()?;
        self.retry.validate()
    }
}

/// Every address must parse and appear only once.
pub fn check_backend_addresses(addresses: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for address in addresses {
        parse_backend_url(address)?;
        if !seen.insert(address.as_str()) {
            return Err(ConfigError::DuplicateAddress(address.clone()));
        }
    }
    Ok(())
}

/// Parses a configured backend address, accepting only http(s) URLs.
pub fn parse_backend_url(address: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(address).map_err(|e| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        scheme => Err(ConfigError::InvalidAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme {:?} or missing host", scheme),
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt budget per dispatch is pool size times this value.
    #[serde(default = "default_attempts_per_backend")]
    pub attempts_per_backend: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts_per_backend == 0 {
            return Err(ConfigError::InvalidRetry(
                "attempts_per_backend must be at least 1".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::InvalidRetry(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_backend: default_attempts_per_backend(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_retry_downtime_secs() -> u64 {
    10
}

fn default_per_attempt_timeout_secs() -> f64 {
    2.0
}

fn default_attempts_per_backend() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    2000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
