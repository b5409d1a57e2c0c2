//! # Taskdesk Domain
//!
//! Business domain types and models for the Taskdesk API client.
//!
//! This crate contains:
//! - Session data types (`Credentials`, `AuthSession`, `UserProfile`)
//! - Auth endpoint payloads
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Taskdesk crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
