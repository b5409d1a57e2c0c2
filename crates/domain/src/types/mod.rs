//! Domain types and models

pub mod auth;
pub mod credentials;
pub mod session;
pub mod user;

pub use auth::{
    AuthPayload, Availability, ChangePasswordRequest, LoginRequest, PasswordResetRequest,
    ProfilePayload, ProfileUpdate, RefreshRequest, RegisterRequest, ResetPasswordRequest,
    VerifyEmailRequest,
};
pub use credentials::Credentials;
pub use session::{AuthSession, SessionState};
pub use user::UserProfile;
