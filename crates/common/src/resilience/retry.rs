//! Retry decisions and backoff calculation
//!
//! The retry loop itself lives with the caller (the request pipeline has to
//! release and re-acquire admission around every wait), so this module only
//! answers two questions: *should* this failure be retried, and *how long*
//! to wait first.

use std::marker::PhantomData;
use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorClassification;

/// Errors raised while building a retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryConfigError {
    #[error("Invalid retry configuration: {0}")]
    Invalid(String),
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Determine if the error should be retried and optionally provide a
    /// custom delay. `attempt` is the zero-based index of the failed attempt.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the default backoff delay
    Retry,
    /// Retry the operation with a custom delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `min(initial_delay * multiplier^attempt, max_delay)`
    Exponential { initial_delay: Duration, multiplier: u32, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before retry number `attempt + 1`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, multiplier, max_delay } => {
                let factor = multiplier.saturating_pow(attempt);
                initial_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed beyond the original attempt
    pub max_retries: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                multiplier: 2,
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`RetryConfigError::Invalid`] for a zero multiplier or an
    /// initial delay larger than the cap.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if let BackoffStrategy::Exponential { initial_delay, multiplier, max_delay } =
            &self.backoff
        {
            if *multiplier == 0 {
                return Err(RetryConfigError::Invalid(
                    "exponential multiplier must be greater than 0".to_string(),
                ));
            }
            if initial_delay > max_delay {
                return Err(RetryConfigError::Invalid(
                    "initial delay must not exceed max delay".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Combine the policy decision with the attempt budget.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when the
    /// failure should be surfaced. `attempt` is the zero-based index of the
    /// attempt that just failed.
    pub fn next_delay<E, P>(&self, policy: &P, error: &E, attempt: u32) -> Option<Duration>
    where
        P: RetryPolicy<E> + ?Sized,
    {
        if attempt >= self.max_retries {
            return None;
        }
        match policy.should_retry(error, attempt) {
            RetryDecision::Retry => Some(self.backoff.calculate_delay(attempt)),
            RetryDecision::RetryAfter(delay) => Some(delay),
            RetryDecision::Stop => None,
        }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.config.backoff =
            BackoffStrategy::Exponential { initial_delay, multiplier: 2, max_delay };
        self
    }

    /// # Errors
    /// See [`RetryConfig::validate`].
    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Policy that defers to the error's own [`ErrorClassification`].
///
/// Retryable errors use the configured backoff unless they carry a
/// `retry_after` hint, which then overrides the computed delay.
#[derive(Debug)]
pub struct ClassifiedRetryPolicy<E> {
    _marker: PhantomData<fn(&E)>,
}

impl<E> ClassifiedRetryPolicy<E> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<E> Default for ClassifiedRetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetryPolicy<E> {
    fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Stop;
        }
        error.retry_after().map_or(RetryDecision::Retry, RetryDecision::RetryAfter)
    }
}
