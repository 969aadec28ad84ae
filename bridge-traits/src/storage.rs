//! Storage Abstractions
//!
//! Provides platform-agnostic traits for secure credential storage, key-value
//! settings storage (the local record of the user's library), and the single
//! remote JSON document the library is synchronized with.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts secure storage mechanisms:
/// - macOS/iOS: Keychain
/// - Android: Keystore
/// - Windows: Credential Manager
/// - Linux: Secret Service / libsecret
///
/// Implementations must never log stored values.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("oauth_token", token.as_bytes()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value for `key`
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// List all secret keys (without values)
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all secrets
    async fn clear_all(&self) -> Result<()>;
}

/// Key-value settings storage trait
///
/// This is the local store behind the library: every collection, the
/// modification timestamp, the backup slots and the cached remote file handle
/// are persisted as string values under well-known keys.
///
/// - Desktop: SQLite-backed key-value table
/// - iOS: UserDefaults
/// - Android: DataStore
/// - Web: localStorage
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_file(store: &dyn SettingsStore, id: &str) -> Result<()> {
///     store.set_string("sync.remote_file_id", id).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;

    /// Begin a transaction for atomic updates
    ///
    /// Nothing written through the transaction is visible until `commit`.
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>>;
}

/// Transaction for atomic settings updates
#[async_trait]
pub trait SettingsTransaction: Send {
    /// Set a value within the transaction
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a value within the transaction
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Bearer credential for remote document calls.
///
/// The `Debug` output never contains the token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Identifies the single remote document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileHandle {
    /// Opaque provider identifier
    pub id: String,
    /// File name as shown in the provider's UI
    pub name: String,
}

impl RemoteFileHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Remote document client
///
/// Finds, creates, reads and overwrites one named JSON file in a cloud store.
/// Every call carries the caller's credential so a single client instance can
/// outlive token refreshes.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// Search for a file by exact name. `Ok(None)` when nothing matches.
    async fn find_by_name(
        &self,
        credential: &AccessToken,
        name: &str,
    ) -> Result<Option<RemoteFileHandle>>;

    /// Create an empty file with the given name
    async fn create(&self, credential: &AccessToken, name: &str) -> Result<RemoteFileHandle>;

    /// Download the full body. `Ok(None)` when the file no longer exists.
    async fn download(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
    ) -> Result<Option<Bytes>>;

    /// Replace the full body
    async fn upload(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
        body: Bytes,
    ) -> Result<()>;
}

/// Builds a configured [`RemoteDocumentStore`] from an API key.
///
/// Called lazily, once per sync session, the first time a sync runs.
pub trait RemoteDocumentConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RemoteDocumentStore>>;
}
