//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! client.

// Auth endpoints (relative to the API base URL)
pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/auth/profile";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub const CHECK_USERNAME_PATH: &str = "/auth/check-username";
pub const CHECK_EMAIL_PATH: &str = "/auth/check-email";
pub const REVOKE_TOKENS_PATH: &str = "/auth/revoke-tokens";

// Identifying headers
pub const HEADER_API_VERSION: &str = "X-API-Version";
pub const HEADER_CLIENT_VERSION: &str = "X-Client-Version";
pub const HEADER_CLIENT_PLATFORM: &str = "X-Client-Platform";
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";
pub const HEADER_REQUESTED_WITH: &str = "X-Requested-With";
pub const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Persisted session keys
pub const STORAGE_KEY_TOKEN: &str = "token";
pub const STORAGE_KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const STORAGE_KEY_TOKEN_EXPIRY: &str = "tokenExpiry";
pub const STORAGE_KEY_REMEMBERED_EMAIL: &str = "rememberedEmail";

// Logout reasons
pub const LOGOUT_REASON_SESSION_EXPIRED: &str = "Session expired";

// Session failure messages
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";
pub const REGISTER_FAILED_MESSAGE: &str = "Registration failed. Please try again.";

// Account operation failure messages
pub const PROFILE_UPDATE_FAILED_MESSAGE: &str = "Profile update failed.";
pub const PASSWORD_CHANGE_FAILED_MESSAGE: &str = "Password change failed.";
pub const PASSWORD_RESET_REQUEST_FAILED_MESSAGE: &str = "Password reset request failed.";
pub const PASSWORD_RESET_FAILED_MESSAGE: &str = "Password reset failed.";
pub const EMAIL_VERIFICATION_FAILED_MESSAGE: &str = "Email verification failed.";
pub const REVOKE_TOKENS_FAILED_MESSAGE: &str = "Failed to revoke sessions.";
