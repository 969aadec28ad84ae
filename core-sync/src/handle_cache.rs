//! Remembered remote file handle
//!
//! The handle found or created on the first sync is kept in memory and in
//! the settings store, so later syncs (and later launches) skip the search.

use crate::error::Result;
use bridge_traits::storage::{RemoteFileHandle, SettingsStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const HANDLE_KEY: &str = "sync.remoteFile";

pub struct RemoteHandleCache {
    settings: Arc<dyn SettingsStore>,
    cached: Mutex<Option<RemoteFileHandle>>,
}

impl RemoteHandleCache {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            cached: Mutex::new(None),
        }
    }

    /// Cached handle, falling back to the persisted one.
    ///
    /// An unreadable persisted entry is dropped and treated as absent.
    pub async fn get(&self) -> Result<Option<RemoteFileHandle>> {
        let mut cached = self.cached.lock().await;
        if cached.is_some() {
            return Ok(cached.clone());
        }

        let Some(raw) = self.settings.get_string(HANDLE_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<RemoteFileHandle>(&raw) {
            Ok(handle) => {
                debug!(file_id = %handle.id, "Loaded remembered remote file");
                *cached = Some(handle.clone());
                Ok(Some(handle))
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable remote file handle");
                self.settings.delete(HANDLE_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn set(&self, handle: &RemoteFileHandle) -> Result<()> {
        let mut cached = self.cached.lock().await;
        self.settings
            .set_string(HANDLE_KEY, &serde_json::to_string(handle)?)
            .await?;
        *cached = Some(handle.clone());
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        self.settings.delete(HANDLE_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;

    async fn cache() -> (RemoteHandleCache, Arc<dyn SettingsStore>) {
        let settings: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        (RemoteHandleCache::new(settings.clone()), settings)
    }

    #[tokio::test]
    async fn test_set_persists_across_instances() {
        let (cache, settings) = cache().await;
        assert!(cache.get().await.unwrap().is_none());

        let handle = RemoteFileHandle::new("file-1", "data.json");
        cache.set(&handle).await.unwrap();
        assert_eq!(cache.get().await.unwrap(), Some(handle.clone()));

        let reopened = RemoteHandleCache::new(settings);
        assert_eq!(reopened.get().await.unwrap(), Some(handle));
    }

    #[tokio::test]
    async fn test_clear_forgets_handle() {
        let (cache, settings) = cache().await;
        cache
            .set(&RemoteFileHandle::new("file-1", "data.json"))
            .await
            .unwrap();
        cache.clear().await.unwrap();

        assert!(cache.get().await.unwrap().is_none());
        assert!(!settings.has_key(HANDLE_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_discarded() {
        let (cache, settings) = cache().await;
        settings.set_string(HANDLE_KEY, "not json").await.unwrap();

        assert!(cache.get().await.unwrap().is_none());
        assert!(!settings.has_key(HANDLE_KEY).await.unwrap());
    }
}
