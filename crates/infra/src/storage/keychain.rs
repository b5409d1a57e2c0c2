//! Platform keychain store
//!
//! Each key becomes its own keychain entry under the configured service name,
//! on macOS (Keychain Access), Windows (Credential Manager) and Linux
//! (Secret Service API). `keyring` calls block, so they run on the blocking
//! pool.

use async_trait::async_trait;
use keyring::Entry;
use taskdesk_domain::{Result, TaskdeskError};
use tracing::debug;

use super::KeyValueStore;

#[derive(Debug, Clone)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "taskdesk")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service_name.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(|e| {
                TaskdeskError::Storage(format!("failed to open keychain entry {key}: {e}"))
            })?;
            op(entry).map_err(|e| {
                TaskdeskError::Storage(format!("keychain access failed for {key}: {e}"))
            })
        })
        .await
        .map_err(|e| TaskdeskError::Internal(format!("keychain task failed: {e}")))?
    }
}

#[async_trait]
impl KeyValueStore for KeychainStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!(service = %self.service_name, key, "reading keychain entry");
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(service = %self.service_name, key, "storing keychain entry");
        let value = value.to_string();
        self.with_entry(key, move |entry| entry.set_password(&value)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!(service = %self.service_name, key, "deleting keychain entry");
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
