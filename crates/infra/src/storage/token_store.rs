//! Persisted session credentials
//!
//! Keys written to the backend:
//!
//! - `token`: access token
//! - `refreshToken`: refresh token (absent when none was issued)
//! - `tokenExpiry`: expiry instant as epoch milliseconds
//! - `rememberedEmail`: login convenience, survives logout
//!
//! Reads on the request path go through an in-memory copy so attaching a
//! bearer token never touches the backend. Only the session lifecycle can
//! write or clear credentials.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use taskdesk_domain::constants::{
    STORAGE_KEY_REFRESH_TOKEN, STORAGE_KEY_REMEMBERED_EMAIL, STORAGE_KEY_TOKEN,
    STORAGE_KEY_TOKEN_EXPIRY,
};
use taskdesk_domain::{Credentials, Result};
use tracing::{debug, warn};

use super::{KeyValueStore, MemoryStore};

#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

struct TokenStoreInner {
    backend: Arc<dyn KeyValueStore>,
    cache: RwLock<Option<Credentials>>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { inner: Arc::new(TokenStoreInner { backend, cache: RwLock::new(None) }) }
    }

    /// Store with no persistence beyond the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Read persisted credentials into memory.
    ///
    /// Returns `None` when no access token is stored. A missing or
    /// unparseable `tokenExpiry` is treated as already expired so the
    /// lifecycle refreshes (or clears) the session instead of trusting it.
    pub async fn load(&self) -> Result<Option<Credentials>> {
        let backend = &self.inner.backend;
        let Some(access) = backend.get(STORAGE_KEY_TOKEN).await? else {
            *self.inner.cache.write() = None;
            return Ok(None);
        };
        let refresh = backend.get(STORAGE_KEY_REFRESH_TOKEN).await?;
        let expiry = backend.get(STORAGE_KEY_TOKEN_EXPIRY).await?;

        let expires_at = expiry
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(|| {
                warn!("stored token expiry missing or invalid, treating session as expired");
                DateTime::<Utc>::MIN_UTC
            });

        let credentials = Credentials::new(access, refresh, expires_at);
        debug!(expires_at = %credentials.expires_at(), "loaded stored credentials");
        *self.inner.cache.write() = Some(credentials.clone());
        Ok(Some(credentials))
    }

    /// Credentials currently in effect.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.cache.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.cache.read().as_ref().map(|c| c.access_token().to_string())
    }

    /// Replace the stored credentials.
    ///
    /// The in-memory copy is updated even when persisting fails, so the
    /// running session keeps working; the error is still returned.
    pub(crate) async fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.inner.cache.write() = Some(credentials.clone());

        let backend = &self.inner.backend;
        backend.set(STORAGE_KEY_TOKEN, credentials.access_token()).await?;
        match credentials.refresh_token() {
            Some(refresh) => backend.set(STORAGE_KEY_REFRESH_TOKEN, refresh).await?,
            None => backend.remove(STORAGE_KEY_REFRESH_TOKEN).await?,
        }
        backend
            .set(STORAGE_KEY_TOKEN_EXPIRY, &credentials.expires_at().timestamp_millis().to_string())
            .await
    }

    /// Remove credentials. The remembered email is kept.
    pub(crate) async fn clear(&self) -> Result<()> {
        *self.inner.cache.write() = None;

        let backend = &self.inner.backend;
        backend.remove(STORAGE_KEY_TOKEN).await?;
        backend.remove(STORAGE_KEY_REFRESH_TOKEN).await?;
        backend.remove(STORAGE_KEY_TOKEN_EXPIRY).await
    }

    pub async fn remember_email(&self, email: &str) -> Result<()> {
        self.inner.backend.set(STORAGE_KEY_REMEMBERED_EMAIL, email).await
    }

    pub async fn remembered_email(&self) -> Result<Option<String>> {
        self.inner.backend.get(STORAGE_KEY_REMEMBERED_EMAIL).await
    }

    pub async fn forget_email(&self) -> Result<()> {
        self.inner.backend.remove(STORAGE_KEY_REMEMBERED_EMAIL).await
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("credentials", &*self.inner.cache.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::FileStore;

    fn sample() -> Credentials {
        let expiry = Utc.timestamp_millis_opt(1_900_000_000_123).single().unwrap();
        Credentials::new("access-1", Some("refresh-1".into()), expiry)
    }

    /// Validates that credentials written through one store are read back
    /// unchanged by a fresh store over the same file.
    ///
    /// Assertions:
    /// - access token, refresh token and expiry millis match
    /// - a fresh store has nothing cached before `load`
    #[tokio::test]
    async fn file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let store = TokenStore::new(Arc::new(FileStore::new(&path)));
        store.save(&sample()).await.unwrap();

        let reopened = TokenStore::new(Arc::new(FileStore::new(&path)));
        assert!(reopened.credentials().is_none());
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(reopened.access_token().as_deref(), Some("access-1"));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["tokenExpiry"], "1900000000123");
    }

    #[tokio::test]
    async fn clear_keeps_remembered_email() {
        let store = TokenStore::in_memory();
        store.save(&sample()).await.unwrap();
        store.remember_email("ada@example.com").await.unwrap();

        store.clear().await.unwrap();

        assert!(store.credentials().is_none());
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.remembered_email().await.unwrap().as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn missing_refresh_token_is_removed() {
        let store = TokenStore::in_memory();
        store.save(&sample()).await.unwrap();

        let rotated = Credentials::new("access-2", None, sample().expires_at());
        store.save(&rotated).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.refresh_token(), None);
    }

    #[tokio::test]
    async fn invalid_expiry_loads_as_expired() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(STORAGE_KEY_TOKEN, "access").await.unwrap();
        backend.set(STORAGE_KEY_TOKEN_EXPIRY, "soon").await.unwrap();

        let store = TokenStore::new(backend);
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.is_expired(Utc::now()));
    }
}
