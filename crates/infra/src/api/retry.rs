//! Retry policy for HTTP requests

use taskdesk_common::resilience::{ClassifiedRetryPolicy, RetryConfig, RetryDecision, RetryPolicy};
use taskdesk_domain::{Result, RetrySettings, TaskdeskError};

use super::errors::{ClientError, ErrorKind};

/// Retries network failures, timeouts and `5xx`; never other `4xx`.
///
/// `429` is surfaced unless `retry_rate_limited` is enabled, in which case
/// its `Retry-After` replaces the computed backoff. `401` is not handled
/// here; the pipeline owns the single refresh-and-retry.
#[derive(Debug, Default)]
pub struct HttpRetryPolicy {
    retry_rate_limited: bool,
    classified: ClassifiedRetryPolicy<ClientError>,
}

impl HttpRetryPolicy {
    pub fn new(retry_rate_limited: bool) -> Self {
        Self { retry_rate_limited, classified: ClassifiedRetryPolicy::new() }
    }
}

impl RetryPolicy<ClientError> for HttpRetryPolicy {
    fn should_retry(&self, error: &ClientError, attempt: u32) -> RetryDecision {
        if error.kind() == ErrorKind::RateLimited && !self.retry_rate_limited {
            return RetryDecision::Stop;
        }
        self.classified.should_retry(error, attempt)
    }
}

/// Backoff configuration from settings.
///
/// # Errors
/// Returns [`TaskdeskError::Config`] when the settings describe an invalid
/// backoff, such as a base delay above the cap.
pub fn retry_config(settings: &RetrySettings) -> Result<RetryConfig> {
    RetryConfig::builder()
        .max_retries(settings.max_retries)
        .exponential_backoff(settings.base_delay(), settings.max_delay())
        .build()
        .map_err(|e| TaskdeskError::Config(e.to_string()))
}
