//! Request and response bodies for the `/auth/*` endpoints

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::user::UserProfile;

/// Body of a successful login, register or refresh response (the `data`
/// member of the response envelope).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(default)]
    pub user: UserProfile,
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body of a successful `/auth/profile` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilePayload {
    #[serde(default)]
    pub user: UserProfile,
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of `PUT /auth/profile`. Only the fields that are set are sent;
/// `extra` carries any other profile fields unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileUpdate {
    /// Trimmed username and trimmed, lower-cased email, as the server
    /// stores them.
    pub fn normalized(mut self) -> Self {
        self.username = self.username.map(|username| username.trim().to_string());
        self.email = self.email.map(|email| email.trim().to_lowercase());
        self
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body of `POST /auth/forgot-password`.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Single-use token from the reset email
    pub token: String,
    pub new_password: String,
}

#[derive(Clone, Serialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Answer of the username and email availability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Availability {
    pub available: bool,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest").field("email", &self.email).finish_non_exhaustive()
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest").finish_non_exhaustive()
    }
}

impl fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetPasswordRequest").finish_non_exhaustive()
    }
}

impl fmt::Debug for VerifyEmailRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyEmailRequest").finish_non_exhaustive()
    }
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn auth_payload_accepts_both_token_spellings() {
        let payload: AuthPayload = serde_json::from_value(json!({
            "user": { "email": "a@b.c" },
            "token": "t1",
            "refreshToken": "r1"
        }))
        .unwrap();
        assert_eq!(payload.token, "t1");
        assert_eq!(payload.refresh_token.as_deref(), Some("r1"));
        assert_eq!(payload.user.get_str("email"), Some("a@b.c"));

        let payload: AuthPayload =
            serde_json::from_value(json!({ "accessToken": "t2" })).unwrap();
        assert_eq!(payload.token, "t2");
        assert!(payload.refresh_token.is_none());
    }

    #[test]
    fn refresh_request_uses_camel_case() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r".into() }).unwrap();
        assert_eq!(body, json!({ "refreshToken": "r" }));
    }

    #[test]
    fn debug_never_prints_passwords() {
        let req = LoginRequest { email: "a@b.c".into(), password: "hunter2".into() };
        assert!(!format!("{req:?}").contains("hunter2"));

        let change = ChangePasswordRequest {
            current_password: "hunter2".into(),
            new_password: "hunter3".into(),
        };
        assert!(!format!("{change:?}").contains("hunter"));

        let reset = ResetPasswordRequest { token: "tok".into(), new_password: "hunter3".into() };
        assert!(!format!("{reset:?}").contains("hunter3"));
    }

    #[test]
    fn password_bodies_use_camel_case() {
        let body = serde_json::to_value(ChangePasswordRequest {
            current_password: "a".into(),
            new_password: "b".into(),
        })
        .unwrap();
        assert_eq!(body, json!({ "currentPassword": "a", "newPassword": "b" }));

        let body = serde_json::to_value(ResetPasswordRequest {
            token: "t".into(),
            new_password: "b".into(),
        })
        .unwrap();
        assert_eq!(body, json!({ "token": "t", "newPassword": "b" }));
    }

    #[test]
    fn profile_update_sends_only_set_fields() {
        let mut extra = Map::new();
        extra.insert("theme".into(), json!("dark"));
        let update = ProfileUpdate {
            username: Some("  ada ".into()),
            email: Some(" Ada@Example.com".into()),
            extra,
        }
        .normalized();

        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, json!({ "username": "ada", "email": "ada@example.com", "theme": "dark" }));

        let empty = serde_json::to_value(ProfileUpdate::default()).unwrap();
        assert_eq!(empty, json!({}));
    }
}
