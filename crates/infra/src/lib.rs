//! # Taskdesk Infrastructure
//!
//! Everything in the Taskdesk client that performs I/O.
//!
//! This crate contains:
//! - HTTP transport and the network status signal
//! - The request pipeline (throttle, deduplication, retry, 401 recovery)
//! - Auth endpoints and the token lifecycle manager
//! - Token storage backends (memory, file, OS keychain)
//! - Configuration loading and logging setup
//!
//! ## Architecture
//! - Depends on `taskdesk-domain` for data types and `taskdesk-common` for
//!   the runtime building blocks
//! - [`TaskdeskClient`] wires one isolated session; nothing here is a
//!   process-wide singleton

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod http;
pub mod logging;
pub mod storage;

// Re-export commonly used items
pub use api::{ApiClient, ApiResponse, ClientError, ErrorKind, RequestDescriptor, RequestPipeline};
pub use auth::{AuthApi, TokenLifecycleManager};
pub use client::{TaskdeskClient, TaskdeskClientBuilder};
pub use http::{HttpTransport, NetworkStatusMonitor};
pub use storage::{KeyValueStore, TokenStore};
