//! Configuration structures
//!
//! Every field has a default so a partial TOML/JSON file (or none at all)
//! yields a usable configuration. Durations are stored as integer
//! milliseconds/seconds and exposed through `std::time::Duration` helpers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskdeskError};

/// Root configuration for a client instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSettings,
    pub retry: RetrySettings,
    pub throttle: ThrottleSettings,
    pub dedup: DedupSettings,
    pub session: SessionSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Remote API endpoint and identifying headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Per-attempt wall-clock timeout
    pub timeout_ms: u64,
    pub api_version: String,
    pub client_version: String,
    pub platform: String,
}

/// Retry/backoff for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries beyond the original attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Retry `429 Too Many Requests` honoring `Retry-After`. Off by default:
    /// rate limiting is surfaced to the caller.
    pub retry_rate_limited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    pub enabled: bool,
    /// Entries older than this are ignored even if still pending
    pub window_ms: u64,
}

/// Token lifecycle timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub refresh_threshold_secs: u64,
    pub poll_interval_secs: u64,
    pub warning_threshold_secs: u64,
    pub warning_interval_secs: u64,
    /// Assumed token lifetime when the expiry claim cannot be decoded
    pub fallback_ttl_secs: u64,
    /// How long a logout notice stays visible
    pub notice_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Keychain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// File path for the `file` backend
    pub path: String,
    /// Keychain service name for the `keychain` backend
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_ms: 30_000,
            api_version: "1.0".to_string(),
            client_version: "1.0.0".to_string(),
            platform: "web".to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 1_000, max_delay_ms: 30_000, retry_rate_limited: false }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self { enabled: true, window_ms: 5_000 }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_threshold_secs: 5 * 60,
            poll_interval_secs: 60,
            warning_threshold_secs: 2 * 60,
            warning_interval_secs: 30,
            fallback_ttl_secs: 60 * 60,
            notice_ttl_secs: 5,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: "taskdesk-session.json".to_string(),
            service_name: "taskdesk".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl DedupSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl SessionSettings {
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn warning_threshold(&self) -> Duration {
        Duration::from_secs(self.warning_threshold_secs)
    }

    pub fn warning_interval(&self) -> Duration {
        Duration::from_secs(self.warning_interval_secs)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }
}

impl Config {
    /// Reject configurations the client cannot run with.
    ///
    /// # Errors
    /// Returns `TaskdeskError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url)
            .map_err(|e| TaskdeskError::Config(format!("Invalid api.base_url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(TaskdeskError::Config(format!(
                "Unsupported api.base_url scheme: {}",
                base.scheme()
            )));
        }
        if self.api.timeout_ms == 0 {
            return Err(TaskdeskError::Config("api.timeout_ms must be positive".to_string()));
        }
        if self.throttle.max_concurrent == 0 {
            return Err(TaskdeskError::Config(
                "throttle.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(TaskdeskError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.session.poll_interval_secs == 0 || self.session.warning_interval_secs == 0 {
            return Err(TaskdeskError::Config("session intervals must be positive".to_string()));
        }
        Ok(())
    }
}
