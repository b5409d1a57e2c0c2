//! Modular common utilities shared across Taskdesk crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification
//! - `runtime`: async infrastructure (resilience, time)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod time;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, ClassifiedRetryPolicy, ConcurrencyThrottle, DedupRole, PendingSlot,
    RequestDeduplicator, RetryConfig, RetryDecision, RetryPolicy, ThrottleError, ThrottleMetrics,
};
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, RuntimeClock, SystemClock, TimerHandle};
