//! Error classification shared across Taskdesk crates
//!
//! Errors that flow through the retry and reporting machinery implement
//! [`ErrorClassification`], which gives a uniform answer to three questions:
//!
//! - **`is_retryable()`**: can the operation succeed if attempted again?
//! - **`severity()`**: how loudly should this be reported?
//! - **`retry_after()`**: did the source suggest a specific delay (e.g. a
//!   `Retry-After` header)?
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Resource not found |
//! | **Warning** | Degraded but operational | Rate limiting, transient failures |
//! | **Error** | Failure requiring attention | Exhausted retries, invalid input |
//! | **Critical** | Session integrity at risk | Forced logout |
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use taskdesk_common::error::{ErrorClassification, ErrorSeverity};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl ErrorClassification for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         ErrorSeverity::Warning
//!     }
//!
//!     fn is_critical(&self) -> bool {
//!         false
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         None
//!     }
//! }
//!
//! assert!(Flaky.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network failures, timeouts and server errors.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the source recommends a specific delay,
    /// or `None` if the caller's backoff applies.
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
