//! Session and token lifecycle
//!
//! - [`TokenLifecycleManager`]: login, refresh scheduling, expiry warnings,
//!   logout, and the pipeline's `401` handler
//! - [`AuthApi`] / [`HttpAuthApi`]: the `/auth/*` endpoint calls
//! - [`ExpiryExtractor`]: pluggable reading of a token's expiry, with
//!   [`CredentialIssuer`] applying the fallback lifetime

pub mod api;
pub mod expiry;
pub mod manager;

pub use api::{AuthApi, HttpAuthApi};
pub use expiry::{CredentialIssuer, ExpiryExtractor, JwtExpiryExtractor};
pub use manager::{plan_refresh, RefreshPlan, TokenLifecycleManager};
