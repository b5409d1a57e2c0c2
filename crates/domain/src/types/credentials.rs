//! Access/refresh token pair with its derived expiry instant

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Credentials issued by the auth endpoints.
///
/// The expiry instant is derived from the access token when the credentials
/// are issued and is never updated on its own; a refresh replaces the whole
/// value. `expires_at` is kept at millisecond precision so that it survives
/// the persisted epoch-millis representation unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    /// Build credentials, truncating `expires_at` to whole milliseconds.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let expires_at =
            DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at);
        Self { access_token: access_token.into(), refresh_token, expires_at }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Remaining lifetime relative to `now`; negative once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// Tokens never appear in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn expiry_is_truncated_to_millis() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).single().unwrap();
        let creds = Credentials::new("a", None, precise);

        assert_eq!(creds.expires_at().timestamp_millis(), precise.timestamp_millis());
        assert_eq!(creds.expires_at().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn expiry_checks_are_relative_to_now() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let creds = Credentials::new("a", Some("r".into()), now + Duration::minutes(3));

        assert_eq!(creds.time_until_expiry(now), Duration::minutes(3));
        assert!(!creds.is_expired(now));
        assert!(creds.is_expired(now + Duration::minutes(3)));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let creds = Credentials::new("secret-access", Some("secret-refresh".into()), Utc::now());
        let rendered = format!("{creds:?}");

        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
