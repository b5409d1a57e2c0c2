//! Resilience patterns for outbound requests
//!
//! - **Retry**: retry decisions and exponential backoff
//! - **Throttle**: FIFO-fair bound on in-flight requests
//! - **Dedup**: sharing one execution between concurrent identical calls
//!
//! These are generic over the operation and error types; the request
//! pipeline in `taskdesk-infra` composes them.

pub mod dedup;
pub mod retry;
pub mod throttle;

pub use dedup::{DedupRole, RequestDeduplicator};
pub use retry::{
    BackoffStrategy, ClassifiedRetryPolicy, RetryConfig, RetryConfigBuilder, RetryConfigError,
    RetryDecision, RetryPolicy,
};
pub use throttle::{ConcurrencyThrottle, PendingSlot, ThrottleError, ThrottleMetrics};
