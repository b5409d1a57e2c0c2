//! Auth endpoint calls
//!
//! Credential-issuing calls (`login`, `register`, `refresh`) are sent
//! anonymously and never trigger the pipeline's own 401 refresh, which would
//! otherwise recurse into the session lifecycle. None of them are
//! deduplicated: each carries a single-use secret. The password reset calls
//! are anonymous too; the remaining account calls ride on the session.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use taskdesk_domain::constants::{
    CHANGE_PASSWORD_PATH, CHECK_EMAIL_PATH, CHECK_USERNAME_PATH, FORGOT_PASSWORD_PATH,
    LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH, REFRESH_PATH, REGISTER_PATH, RESET_PASSWORD_PATH,
    REVOKE_TOKENS_PATH, VERIFY_EMAIL_PATH,
};
use taskdesk_domain::{
    AuthPayload, Availability, ChangePasswordRequest, LoginRequest, PasswordResetRequest,
    ProfilePayload, ProfileUpdate, RefreshRequest, RegisterRequest, ResetPasswordRequest,
    UserProfile, VerifyEmailRequest,
};

use crate::api::{ClientError, ErrorKind, RequestDescriptor, RequestPipeline};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, ClientError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthPayload, ClientError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthPayload, ClientError>;

    /// Invalidate the current session server-side.
    async fn logout(&self) -> Result<(), ClientError>;

    async fn profile(&self) -> Result<UserProfile, ClientError>;

    /// Store profile changes; returns the profile as the server now has it.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ClientError>;

    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<(), ClientError>;

    /// Ask the server to email a reset link.
    async fn request_password_reset(
        &self,
        request: &PasswordResetRequest,
    ) -> Result<(), ClientError>;

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), ClientError>;

    async fn verify_email(&self, request: &VerifyEmailRequest) -> Result<(), ClientError>;

    async fn check_username(&self, username: &str) -> Result<bool, ClientError>;

    async fn check_email(&self, email: &str) -> Result<bool, ClientError>;

    /// Invalidate every refresh token of the account, on all devices.
    async fn revoke_tokens(&self) -> Result<(), ClientError>;
}

/// [`AuthApi`] over the shared request pipeline.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    pipeline: RequestPipeline,
}

impl HttpAuthApi {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    async fn command(&self, descriptor: RequestDescriptor) -> Result<(), ClientError> {
        self.pipeline.send(descriptor.no_dedup()).await.map(|_| ())
    }

    async fn availability(&self, path: &str, field: &str, value: &str) -> Result<bool, ClientError> {
        let descriptor = RequestDescriptor::get(path).param(field, value).anonymous();
        let answer: Availability = self.pipeline.send(descriptor).await?.data()?;
        Ok(answer.available)
    }

    async fn issue<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthPayload, ClientError> {
        let body = encode(body)?;
        let descriptor =
            RequestDescriptor::post(path).json(body).anonymous().no_auth_refresh().no_dedup();
        self.pipeline.send(descriptor).await?.data()
    }
}

fn encode<B: Serialize>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| {
        ClientError::new(ErrorKind::Unknown)
            .with_message(format!("Request body could not be encoded: {e}"))
    })
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, ClientError> {
        self.issue(LOGIN_PATH, request).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthPayload, ClientError> {
        self.issue(REGISTER_PATH, request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthPayload, ClientError> {
        let request = RefreshRequest { refresh_token: refresh_token.to_string() };
        self.issue(REFRESH_PATH, &request).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let descriptor = RequestDescriptor::post(LOGOUT_PATH).no_auth_refresh().no_dedup();
        self.pipeline.send(descriptor).await.map(|_| ())
    }

    async fn profile(&self) -> Result<UserProfile, ClientError> {
        let descriptor = RequestDescriptor::get(PROFILE_PATH).no_auth_refresh().no_dedup();
        let payload: ProfilePayload = self.pipeline.send(descriptor).await?.data()?;
        Ok(payload.user)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ClientError> {
        let descriptor = RequestDescriptor::put(PROFILE_PATH).json(encode(update)?).no_dedup();
        let payload: ProfilePayload = self.pipeline.send(descriptor).await?.data()?;
        Ok(payload.user)
    }

    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<(), ClientError> {
        self.command(RequestDescriptor::put(CHANGE_PASSWORD_PATH).json(encode(request)?)).await
    }

    async fn request_password_reset(
        &self,
        request: &PasswordResetRequest,
    ) -> Result<(), ClientError> {
        let descriptor = RequestDescriptor::post(FORGOT_PASSWORD_PATH)
            .json(encode(request)?)
            .anonymous()
            .no_auth_refresh();
        self.command(descriptor).await
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), ClientError> {
        let descriptor = RequestDescriptor::post(RESET_PASSWORD_PATH)
            .json(encode(request)?)
            .anonymous()
            .no_auth_refresh();
        self.command(descriptor).await
    }

    async fn verify_email(&self, request: &VerifyEmailRequest) -> Result<(), ClientError> {
        self.command(RequestDescriptor::post(VERIFY_EMAIL_PATH).json(encode(request)?)).await
    }

    async fn check_username(&self, username: &str) -> Result<bool, ClientError> {
        self.availability(CHECK_USERNAME_PATH, "username", username).await
    }

    async fn check_email(&self, email: &str) -> Result<bool, ClientError> {
        self.availability(CHECK_EMAIL_PATH, "email", email).await
    }

    async fn revoke_tokens(&self) -> Result<(), ClientError> {
        self.command(RequestDescriptor::post(REVOKE_TOKENS_PATH)).await
    }
}
