//! Session persistence
//!
//! [`TokenStore`] is the single owner of persisted session values. It sits on
//! top of a [`KeyValueStore`] backend:
//!
//! | Backend          | Durability             | Use                      |
//! |------------------|------------------------|--------------------------|
//! | [`MemoryStore`]  | process lifetime       | tests, ephemeral clients |
//! | [`FileStore`]    | JSON file on disk      | default desktop/CLI use  |
//! | [`KeychainStore`]| platform keychain      | hardened installs        |

pub mod file;
pub mod keychain;
pub mod memory;
pub mod token_store;

use std::sync::Arc;

use async_trait::async_trait;
use taskdesk_domain::{Result, StorageBackend, StorageSettings};

pub use file::FileStore;
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
pub use token_store::TokenStore;

/// String key/value persistence used by [`TokenStore`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Backend selected by the storage settings.
pub fn backend_from_settings(settings: &StorageSettings) -> Arc<dyn KeyValueStore> {
    match settings.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(FileStore::new(&settings.path)),
        StorageBackend::Keychain => Arc::new(KeychainStore::new(&settings.service_name)),
    }
}
