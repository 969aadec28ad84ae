//! Local library store
//!
//! Persists the [`SyncDocument`] in the host [`SettingsStore`] as four keys:
//! one JSON array per collection plus the `lastModified` stamp. All writes go
//! through a settings transaction so a crash never leaves the collections and
//! the stamp out of step.
//!
//! Every user mutation advances `lastModified` strictly:
//! `max(now, previous + 1 ms)`. A wall clock that steps backwards therefore
//! never makes a newer local edit look older than the remote copy.

use crate::backup::{BackupKind, BackupSlot};
use crate::document::{format_timestamp, parse_timestamp, SyncDocument};
use crate::error::{LibraryError, Result};
use crate::models::{BibleLocation, Keyword, Material, MaterialDraft, Sermon};
use bridge_traits::storage::{SettingsStore, SettingsTransaction};
use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, Utc};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const KEY_KEYWORDS: &str = "library.keywords";
pub const KEY_BIBLE_DATA: &str = "library.bibleData";
pub const KEY_SERMONS: &str = "library.sermons";
pub const KEY_LAST_MODIFIED: &str = "library.lastModified";

/// Handle to the persisted library.
///
/// Cheap to clone; clones share the write lock.
#[derive(Clone)]
pub struct LibraryStore {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    write_lock: Arc<Mutex<()>>,
}

impl LibraryStore {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            settings,
            clock,
            event_bus,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The single-slot backup of the given kind.
    pub fn backup_slot(&self, kind: BackupKind) -> BackupSlot {
        BackupSlot::new(
            kind,
            self.settings.clone(),
            self.clock.clone(),
            self.event_bus.clone(),
        )
    }

    /// Current document. Missing keys read as empty collections and an epoch
    /// stamp.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<SyncDocument> {
        let keywords = self.read_collection::<Keyword>(KEY_KEYWORDS).await?;
        let bible_locations = self.read_collection::<BibleLocation>(KEY_BIBLE_DATA).await?;
        let sermons = self.read_collection::<Sermon>(KEY_SERMONS).await?;
        let last_modified = match self.settings.get_string(KEY_LAST_MODIFIED).await? {
            Some(raw) => parse_timestamp(&Value::String(raw)),
            None => crate::document::epoch(),
        };

        Ok(SyncDocument {
            keywords,
            bible_locations,
            sermons,
            last_modified,
        })
    }

    /// Overwrite the collections and stamp exactly as given.
    ///
    /// Used when the remote copy wins and when a backup is restored; the
    /// stamp is not advanced.
    #[instrument(skip(self, document), fields(last_modified = %format_timestamp(&document.last_modified)))]
    pub async fn replace_document(&self, document: &SyncDocument, reason: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(document).await?;
        self.emit_changed(document, reason);
        info!(
            keywords = document.keywords.len(),
            bible_locations = document.bible_locations.len(),
            sermons = document.sermons.len(),
            reason,
            "Library document replaced"
        );
        Ok(())
    }

    /// Advance `lastModified` without touching the collections.
    pub async fn touch(&self) -> Result<DateTime<Utc>> {
        self.mutate("touch", |_| Ok(())).await?;
        Ok(self.snapshot().await?.last_modified)
    }

    /// Pretty-printed document in the remote wire format.
    pub async fn export_json(&self) -> Result<String> {
        self.snapshot().await?.to_json_pretty()
    }

    // ------------------------------------------------------------------
    // Keywords
    // ------------------------------------------------------------------

    pub async fn add_keyword(&self, name: &str) -> Result<Keyword> {
        let keyword = Keyword::new(name.trim());
        keyword
            .validate()
            .map_err(|e| LibraryError::invalid("name", e))?;

        self.mutate("keyword_added", |doc| {
            if doc
                .keywords
                .iter()
                .any(|k| k.name.trim().eq_ignore_ascii_case(&keyword.name))
            {
                return Err(LibraryError::invalid(
                    "name",
                    format!("Keyword '{}' already exists", keyword.name),
                ));
            }
            doc.keywords.push(keyword.clone());
            Ok(keyword)
        })
        .await
    }

    pub async fn rename_keyword(&self, id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::invalid("name", "Keyword name cannot be empty"));
        }

        self.mutate("keyword_renamed", |doc| {
            let keyword = doc
                .keywords
                .iter_mut()
                .find(|k| k.id == id)
                .ok_or_else(|| LibraryError::not_found("Keyword", id))?;
            keyword.name = name.to_string();
            Ok(())
        })
        .await
    }

    pub async fn remove_keyword(&self, id: &str) -> Result<Keyword> {
        self.mutate("keyword_removed", |doc| {
            let index = doc
                .keywords
                .iter()
                .position(|k| k.id == id)
                .ok_or_else(|| LibraryError::not_found("Keyword", id))?;
            Ok(doc.keywords.remove(index))
        })
        .await
    }

    pub async fn add_keyword_material(&self, keyword_id: &str, draft: MaterialDraft) -> Result<Material> {
        draft
            .validate()
            .map_err(|e| LibraryError::invalid("content", e))?;
        let material = Material::new(draft);

        self.mutate("material_added", |doc| {
            let keyword = doc
                .keywords
                .iter_mut()
                .find(|k| k.id == keyword_id)
                .ok_or_else(|| LibraryError::not_found("Keyword", keyword_id))?;
            keyword.materials.push(material.clone());
            Ok(material)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Bible locations
    // ------------------------------------------------------------------

    /// Add a Bible reference, or return the existing entry for the same
    /// reference without changing anything.
    pub async fn add_bible_location(&self, book: &str, chapter: &str, verse: &str) -> Result<BibleLocation> {
        let location = BibleLocation::new(book.trim(), chapter.trim(), verse.trim());
        location
            .validate()
            .map_err(|e| LibraryError::invalid("book", e))?;

        self.mutate_if_changed("bible_location_added", |doc| {
            if let Some(existing) = doc
                .bible_locations
                .iter()
                .find(|b| b.same_reference(&location))
            {
                debug!(reference = %existing.reference(), "Bible location already present");
                return Ok((existing.clone(), false));
            }
            doc.bible_locations.push(location.clone());
            Ok((location, true))
        })
        .await
    }

    pub async fn remove_bible_location(&self, id: &str) -> Result<BibleLocation> {
        self.mutate("bible_location_removed", |doc| {
            let index = doc
                .bible_locations
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| LibraryError::not_found("BibleLocation", id))?;
            Ok(doc.bible_locations.remove(index))
        })
        .await
    }

    pub async fn add_bible_material(&self, location_id: &str, draft: MaterialDraft) -> Result<Material> {
        draft
            .validate()
            .map_err(|e| LibraryError::invalid("content", e))?;
        let material = Material::new(draft);

        self.mutate("material_added", |doc| {
            let location = doc
                .bible_locations
                .iter_mut()
                .find(|b| b.id == location_id)
                .ok_or_else(|| LibraryError::not_found("BibleLocation", location_id))?;
            location.materials.push(material.clone());
            Ok(material)
        })
        .await
    }

    /// Remove a material wherever it is filed.
    pub async fn remove_material(&self, material_id: &str) -> Result<Material> {
        self.mutate("material_removed", |doc| {
            let lists = doc
                .keywords
                .iter_mut()
                .map(|k| &mut k.materials)
                .chain(doc.bible_locations.iter_mut().map(|b| &mut b.materials));

            for materials in lists {
                if let Some(index) = materials.iter().position(|m| m.id == material_id) {
                    return Ok(materials.remove(index));
                }
            }
            Err(LibraryError::not_found("Material", material_id))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Sermons
    // ------------------------------------------------------------------

    /// Insert a sermon, or update the one with the same id. A blank id gets a
    /// fresh one.
    pub async fn save_sermon(&self, mut sermon: Sermon) -> Result<Sermon> {
        sermon
            .validate()
            .map_err(|e| LibraryError::invalid("title", e))?;
        if sermon.id.trim().is_empty() {
            sermon.id = crate::models::new_id();
        }

        self.mutate("sermon_saved", |doc| {
            match doc.sermons.iter_mut().find(|s| s.id == sermon.id) {
                Some(existing) => *existing = sermon.clone(),
                None => doc.sermons.push(sermon.clone()),
            }
            Ok(sermon)
        })
        .await
    }

    pub async fn remove_sermon(&self, id: &str) -> Result<Sermon> {
        self.mutate("sermon_removed", |doc| {
            let index = doc
                .sermons
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| LibraryError::not_found("Sermon", id))?;
            Ok(doc.sermons.remove(index))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Load, apply `change`, stamp and persist under the write lock. Nothing
    /// is written when `change` fails.
    pub(crate) async fn mutate<T>(
        &self,
        reason: &str,
        change: impl FnOnce(&mut SyncDocument) -> Result<T>,
    ) -> Result<T> {
        self.mutate_if_changed(reason, |doc| change(doc).map(|value| (value, true)))
            .await
    }

    /// Like [`mutate`](Self::mutate), but the change reports whether it
    /// touched the document. An untouched document is neither stamped nor
    /// persisted.
    async fn mutate_if_changed<T>(
        &self,
        reason: &str,
        change: impl FnOnce(&mut SyncDocument) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.snapshot().await?;
        let (value, changed) = change(&mut document)?;
        if !changed {
            return Ok(value);
        }

        document.last_modified = self.next_stamp(document.last_modified);
        self.persist(&document).await?;
        self.emit_changed(&document, reason);

        debug!(
            reason,
            last_modified = %format_timestamp(&document.last_modified),
            "Library mutated"
        );
        Ok(value)
    }

    fn next_stamp(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.clock.now();
        let floor = previous + Duration::milliseconds(1);
        if now >= floor {
            now
        } else {
            warn!("Clock is behind the last stamp, advancing by 1 ms");
            floor
        }
    }

    async fn persist(&self, document: &SyncDocument) -> Result<()> {
        let mut tx = self.settings.begin_transaction().await?;
        match write_document(tx.as_mut(), document).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.settings.get_string(key).await? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| LibraryError::CorruptedData {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn emit_changed(&self, document: &SyncDocument, reason: &str) {
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::DocumentChanged {
                last_modified: document.last_modified_millis(),
                reason: reason.to_string(),
            }))
            .ok();
    }
}

async fn write_document(tx: &mut (dyn SettingsTransaction + Send), document: &SyncDocument) -> Result<()> {
    tx.set_string(KEY_KEYWORDS, &serde_json::to_string(&document.keywords)?)
        .await?;
    tx.set_string(KEY_BIBLE_DATA, &serde_json::to_string(&document.bible_locations)?)
        .await?;
    tx.set_string(KEY_SERMONS, &serde_json::to_string(&document.sermons)?)
        .await?;
    tx.set_string(KEY_LAST_MODIFIED, &format_timestamp(&document.last_modified))
        .await?;
    Ok(())
}
