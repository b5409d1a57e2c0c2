//! Authentication state machine values

use serde::{Deserialize, Serialize};

use super::credentials::Credentials;
use super::user::UserProfile;

/// Current authentication state of a client session.
///
/// Exactly one variant holds at a time. Transitions:
/// `Idle -> Loading -> {Authenticated, Unauthenticated, Error}`;
/// `Authenticated` self-transitions on refresh and falls back to
/// `Unauthenticated` on logout or expiry; `Error` is left by the next
/// explicit login or registration attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthSession {
    #[default]
    Idle,
    Loading,
    Authenticated {
        user: UserProfile,
        credentials: Credentials,
    },
    Unauthenticated,
    Error {
        message: String,
    },
}

/// Discriminant of [`AuthSession`] without its payload, for logging and
/// cheap comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Loading,
    Authenticated,
    Unauthenticated,
    Error,
}

impl AuthSession {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Loading => SessionState::Loading,
            Self::Authenticated { .. } => SessionState::Authenticated,
            Self::Unauthenticated => SessionState::Unauthenticated,
            Self::Error { .. } => SessionState::Error,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Authenticated { credentials, .. } => Some(credentials),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
