//! Access token expiry extraction

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use taskdesk_common::time::Clock;
use taskdesk_domain::Credentials;
use tracing::debug;

/// Reads the expiry instant encoded in an access token.
pub trait ExpiryExtractor: Send + Sync {
    /// `None` when the token carries no readable expiry.
    fn expires_at(&self, token: &str) -> Option<DateTime<Utc>>;
}

/// Decodes the `exp` claim (epoch seconds) of a JWT payload.
///
/// The signature is not verified; the value only drives client-side
/// scheduling and the server remains the authority on validity.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtExpiryExtractor;

impl ExpiryExtractor for JwtExpiryExtractor {
    fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: Value = serde_json::from_slice(&bytes).ok()?;

        let exp = claims.get("exp")?;
        let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))?;
        DateTime::from_timestamp(seconds, 0)
    }
}

/// Builds [`Credentials`] from freshly issued tokens.
///
/// The expiry is computed here and only here, together with the token it
/// belongs to. Tokens without a readable expiry get `now + fallback_ttl`.
#[derive(Clone)]
pub struct CredentialIssuer {
    extractor: Arc<dyn ExpiryExtractor>,
    clock: Arc<dyn Clock>,
    fallback_ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(
        extractor: Arc<dyn ExpiryExtractor>,
        clock: Arc<dyn Clock>,
        fallback_ttl: Duration,
    ) -> Self {
        Self { extractor, clock, fallback_ttl }
    }

    pub fn issue(&self, access_token: String, refresh_token: Option<String>) -> Credentials {
        let expires_at = self.extractor.expires_at(&access_token).unwrap_or_else(|| {
            debug!(
                fallback_secs = self.fallback_ttl.as_secs(),
                "token expiry unreadable, using fallback lifetime"
            );
            let ttl = chrono::Duration::from_std(self.fallback_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
            self.clock.now() + ttl
        });
        Credentials::new(access_token, refresh_token, expires_at)
    }
}

impl std::fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("fallback_ttl", &self.fallback_ttl)
            .finish_non_exhaustive()
    }
}
