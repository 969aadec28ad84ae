//! Single-slot local backups
//!
//! Two slots share one discipline:
//! - **sync**: written right before a remote copy may overwrite the library
//! - **import**: written right before a bulk import changes the collections
//!
//! Capturing overwrites the slot; slots never expire. Restoring requires a
//! confirmation and writes the captured collections and stamp back exactly.

use crate::document::{format_timestamp, SyncDocument};
use crate::error::{LibraryError, Result};
use crate::store::LibraryStore;
use bridge_traits::prompt::{ConfirmRequest, ConfirmationPrompt};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Sync,
    Import,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Sync => "sync",
            BackupKind::Import => "import",
        }
    }

    fn storage_key(&self) -> &'static str {
        match self {
            BackupKind::Sync => "backup.sync",
            BackupKind::Import => "backup.import",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BackupKind::Sync => "pre-sync backup",
            BackupKind::Import => "pre-import backup",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a slot holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub captured_at: DateTime<Utc>,
    pub document: SyncDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Slot empty; nothing changed
    Unavailable,
    /// User said no; nothing changed
    Declined,
    /// Library now equals the captured document
    Restored { last_modified: DateTime<Utc> },
}

pub struct BackupSlot {
    kind: BackupKind,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl BackupSlot {
    pub fn new(
        kind: BackupKind,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            kind,
            settings,
            clock,
            event_bus,
        }
    }

    pub fn kind(&self) -> BackupKind {
        self.kind
    }

    /// Overwrite the slot with `document`.
    #[instrument(skip(self, document), fields(slot = %self.kind))]
    pub async fn capture(&self, document: &SyncDocument) -> Result<BackupRecord> {
        let record = BackupRecord {
            captured_at: self.clock.now(),
            document: document.clone(),
        };
        self.settings
            .set_string(self.kind.storage_key(), &serde_json::to_string(&record)?)
            .await?;

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::BackupCreated {
                slot: self.kind.to_string(),
                captured_at: record.captured_at.timestamp_millis(),
            }))
            .ok();

        info!(
            last_modified = %format_timestamp(&document.last_modified),
            "Backup captured"
        );
        Ok(record)
    }

    pub async fn is_available(&self) -> Result<bool> {
        Ok(self.settings.has_key(self.kind.storage_key()).await?)
    }

    /// Read the slot.
    ///
    /// # Errors
    ///
    /// `CorruptedBackup` when the slot holds something that does not parse.
    pub async fn load(&self) -> Result<Option<BackupRecord>> {
        let Some(raw) = self.settings.get_string(self.kind.storage_key()).await? else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| LibraryError::CorruptedBackup {
                slot: self.kind.to_string(),
                reason: e.to_string(),
            })
    }

    /// Put the captured document back after asking the user.
    ///
    /// The slot itself is kept, so the same backup can be restored again.
    #[instrument(skip(self, store, prompt), fields(slot = %self.kind))]
    pub async fn restore(
        &self,
        store: &LibraryStore,
        prompt: &dyn ConfirmationPrompt,
    ) -> Result<RestoreOutcome> {
        let record = match self.load().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("No backup available");
                return Ok(RestoreOutcome::Unavailable);
            }
            Err(e) => {
                warn!(error = %e, "Backup unreadable, leaving library untouched");
                return Err(e);
            }
        };

        let request = ConfirmRequest::RestoreBackup {
            label: self.kind.label().to_string(),
            captured_at: record.captured_at,
        };
        if !prompt.confirm(&request).await {
            info!("Restore declined");
            return Ok(RestoreOutcome::Declined);
        }

        store
            .replace_document(&record.document, &format!("{}_backup_restored", self.kind))
            .await?;

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::BackupRestored {
                slot: self.kind.to_string(),
                last_modified: record.document.last_modified_millis(),
            }))
            .ok();

        Ok(RestoreOutcome::Restored {
            last_modified: record.document.last_modified,
        })
    }

    /// Empty the slot.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.settings.delete(self.kind.storage_key()).await?)
    }
}
