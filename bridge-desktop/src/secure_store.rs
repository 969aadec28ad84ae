//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Keyring entry holding the JSON list of keys written through this store.
/// The OS keychains cannot be enumerated per service, so the store keeps its
/// own index to support `list_keys` and `clear_all` (used on sign-out).
const INDEX_KEY: &str = "__keys";

/// Keyring-based secure storage implementation
///
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
pub struct KeyringSecureStore {
    service_name: String,
    index_lock: Mutex<()>,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name("sermon-organizer-core")
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(map_keyring_error)
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.entry(INDEX_KEY)?.get_password() {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Secure store key index unreadable, starting fresh");
                Vec::new()
            })),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        let entry = self.entry(INDEX_KEY)?;
        if keys.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(map_keyring_error(e)),
            };
        }
        let raw = serde_json::to_string(keys)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to encode index: {}", e)))?;
        entry.set_password(&raw).map_err(map_keyring_error)
    }

    fn delete_entry(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn map_keyring_error(e: keyring::Error) -> BridgeError {
    match e {
        keyring::Error::NoStorageAccess(inner) => {
            BridgeError::NotAvailable(format!("Keyring not accessible: {}", inner))
        }
        keyring::Error::PlatformFailure(inner) => {
            BridgeError::NotAvailable(format!("Keyring platform failure: {}", inner))
        }
        other => BridgeError::OperationFailed(format!("Keyring error: {}", other)),
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        // Keyring only stores strings
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(map_keyring_error)?;

        let mut keys = self.read_index()?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.write_index(&keys)?;
        }

        debug!(key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(encoded).map_err(|e| {
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        self.delete_entry(key)?;

        let mut keys = self.read_index()?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys)?;
        }

        debug!(key, "Deleted secret from keyring");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.read_index()
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        let keys = self.read_index()?;
        for key in &keys {
            self.delete_entry(key)?;
        }
        self.write_index(&[])?;

        debug!(count = keys.len(), "Cleared keyring secrets");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let store = KeyringSecureStore::new();
        assert_eq!(store.service_name, "sermon-organizer-core");
    }

    #[test]
    fn test_no_storage_access_maps_to_not_available() {
        let err = map_keyring_error(keyring::Error::NoStorageAccess(Box::new(
            std::io::Error::new(std::io::ErrorKind::Other, "locked"),
        )));
        assert!(matches!(err, BridgeError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_round_trip_when_keyring_available() {
        // Headless CI machines often have no secret service; skip there.
        let store = KeyringSecureStore::with_service_name("sermon-organizer-core-test");
        let key = "roundtrip-key";

        if let Err(e) = store.set_secret(key, b"secret-bytes").await {
            println!("Keyring not available ({}), skipping test", e);
            return;
        }

        match store.get_secret(key).await {
            Ok(Some(value)) => assert_eq!(value, b"secret-bytes".to_vec()),
            other => println!("Keyring read inconsistent ({:?}), skipping", other.is_ok()),
        }

        store.clear_all().await.unwrap();
        assert_eq!(store.get_secret(key).await.unwrap(), None);
    }
}
