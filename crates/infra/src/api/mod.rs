//! Resilient request pipeline for the Taskdesk REST API
//!
//! # Architecture
//!
//! - [`RequestPipeline`]: dedup, throttle, send, classify, retry, and the
//!   single refresh-and-resubmit on `401`
//! - [`ErrorClassifier`]: status/transport failure to [`ErrorKind`]
//! - [`HttpRetryPolicy`]: which failures are retried (network, timeout, 5xx)
//! - Pre-send and post-receive [`steps`] instead of shared mutable
//!   interceptors
//! - [`ApiClient`]: verb helpers over the pipeline
//!
//! Every network attempt has its own wall-clock timeout; no call waits on
//! the network unbounded.

pub mod classifier;
pub mod client;
pub mod errors;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod retry;
pub mod steps;

pub use classifier::ErrorClassifier;
pub use client::{ApiClient, ClientStats};
pub use errors::{ClientError, ErrorKind, FieldErrors};
pub use pipeline::{PipelineStats, RequestPipeline, RequestPipelineBuilder, UnauthorizedHandler};
pub use request::{DedupKey, RequestDescriptor, RequestOptions};
pub use response::ApiResponse;
pub use retry::{retry_config, HttpRetryPolicy};
pub use steps::{
    AttemptContext, AttemptOutcome, BearerAuth, IdentityHeaders, RequestIdHeader, RequestStep,
    ResponseStep,
};
