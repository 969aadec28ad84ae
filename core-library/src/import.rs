//! Bulk import
//!
//! Spreadsheet parsing happens in the host; it hands over an [`ImportBatch`]
//! of already-decoded records. The current library is captured in the import
//! backup slot before anything changes.

use crate::backup::{BackupKind, RestoreOutcome};
use crate::document::SyncDocument;
use crate::error::{LibraryError, Result};
use crate::models::{new_id, BibleLocation, Keyword, Material, Sermon};
use crate::store::LibraryStore;
use bridge_traits::prompt::ConfirmationPrompt;
use core_runtime::events::{CoreEvent, LibraryEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// The batch becomes the whole library
    Replace,
    /// The batch is merged into the library
    Append,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Replace => f.write_str("replace"),
            ImportMode::Append => f.write_str("append"),
        }
    }
}

/// Records decoded from an import file.
///
/// Deserializes from the same shape as the sync document, so an exported
/// JSON file is a valid batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default, rename = "bibleData")]
    pub bible_locations: Vec<BibleLocation>,
    #[serde(default)]
    pub sermons: Vec<Sermon>,
}

impl ImportBatch {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.bible_locations.is_empty() && self.sermons.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for keyword in &self.keywords {
            keyword
                .validate()
                .map_err(|e| LibraryError::invalid("keywords", e))?;
        }
        for location in &self.bible_locations {
            location
                .validate()
                .map_err(|e| LibraryError::invalid("bibleData", e))?;
        }
        for sermon in &self.sermons {
            sermon
                .validate()
                .map_err(|e| LibraryError::invalid("sermons", e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub mode: ImportMode,
    pub keywords: usize,
    pub bible_locations: usize,
    pub sermons: usize,
}

impl LibraryStore {
    /// Apply an import batch.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty batch or a record failing validation; the
    /// backup slot is not touched in that case.
    #[instrument(skip(self, batch), fields(mode = %mode))]
    pub async fn import(&self, batch: ImportBatch, mode: ImportMode) -> Result<ImportSummary> {
        if batch.is_empty() {
            return Err(LibraryError::invalid("batch", "Nothing to import"));
        }
        batch.validate()?;

        let current = self.snapshot().await?;
        self.backup_slot(BackupKind::Import).capture(&current).await?;

        let summary = ImportSummary {
            mode,
            keywords: batch.keywords.len(),
            bible_locations: batch.bible_locations.len(),
            sermons: batch.sermons.len(),
        };

        self.mutate("import", |doc| {
            match mode {
                ImportMode::Replace => replace_collections(doc, batch),
                ImportMode::Append => append_collections(doc, batch),
            }
            Ok(())
        })
        .await?;

        self.event_bus()
            .emit(CoreEvent::Library(LibraryEvent::Imported {
                mode: mode.to_string(),
                keywords: summary.keywords,
                bible_locations: summary.bible_locations,
                sermons: summary.sermons,
            }))
            .ok();

        info!(
            keywords = summary.keywords,
            bible_locations = summary.bible_locations,
            sermons = summary.sermons,
            "Import applied"
        );
        Ok(summary)
    }

    pub async fn restore_import_backup(&self, prompt: &dyn ConfirmationPrompt) -> Result<RestoreOutcome> {
        self.backup_slot(BackupKind::Import).restore(self, prompt).await
    }
}

fn replace_collections(doc: &mut SyncDocument, batch: ImportBatch) {
    doc.keywords = batch.keywords;
    doc.bible_locations = batch.bible_locations;
    doc.sermons = batch.sermons;
}

/// Keywords merge by name and Bible locations by reference, concatenating
/// materials. Sermons are appended; an id already in use is replaced with a
/// fresh one.
fn append_collections(doc: &mut SyncDocument, batch: ImportBatch) {
    for incoming in batch.keywords {
        let name = incoming.name.trim().to_lowercase();
        match doc
            .keywords
            .iter_mut()
            .find(|k| k.name.trim().to_lowercase() == name)
        {
            Some(existing) => merge_materials(&mut existing.materials, incoming.materials),
            None => doc.keywords.push(incoming),
        }
    }

    for incoming in batch.bible_locations {
        match doc
            .bible_locations
            .iter_mut()
            .find(|b| b.same_reference(&incoming))
        {
            Some(existing) => merge_materials(&mut existing.materials, incoming.materials),
            None => doc.bible_locations.push(incoming),
        }
    }

    let mut ids: HashSet<String> = doc.sermons.iter().map(|s| s.id.clone()).collect();
    for mut sermon in batch.sermons {
        if sermon.id.trim().is_empty() || ids.contains(&sermon.id) {
            sermon.id = new_id();
        }
        ids.insert(sermon.id.clone());
        doc.sermons.push(sermon);
    }
}

/// Skip materials whose text is already present.
fn merge_materials(target: &mut Vec<Material>, incoming: Vec<Material>) {
    for material in incoming {
        let duplicate = target
            .iter()
            .any(|m| m.content.trim() == material.content.trim() && m.source == material.source);
        if !duplicate {
            target.push(material);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MaterialDraft;
    use crate::store::tests::{test_store, FixedClock};
    use async_trait::async_trait;
    use bridge_traits::prompt::ConfirmRequest;

    struct Always(bool);

    #[async_trait]
    impl ConfirmationPrompt for Always {
        async fn confirm(&self, _request: &ConfirmRequest) -> bool {
            self.0
        }
    }

    fn keyword_with(name: &str, contents: &[&str]) -> Keyword {
        let mut keyword = Keyword::new(name);
        keyword.materials = contents
            .iter()
            .map(|c| Material::new(MaterialDraft::new(*c)))
            .collect();
        keyword
    }

    #[tokio::test]
    async fn test_replace_import_backs_up_first() {
        let store = test_store(FixedClock::at_millis(10_000)).await;
        store.add_keyword("Old").await.unwrap();
        let before = store.snapshot().await.unwrap();

        let batch = ImportBatch {
            keywords: vec![keyword_with("New", &["quote"])],
            sermons: vec![Sermon::new("Imported", "body")],
            ..ImportBatch::default()
        };
        let summary = store.import(batch, ImportMode::Replace).await.unwrap();
        assert_eq!(summary.keywords, 1);
        assert_eq!(summary.sermons, 1);

        let after = store.snapshot().await.unwrap();
        assert_eq!(after.keywords.len(), 1);
        assert_eq!(after.keywords[0].name, "New");
        assert!(after.last_modified > before.last_modified);

        let backup = store
            .backup_slot(BackupKind::Import)
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backup.document, before);
    }

    #[tokio::test]
    async fn test_append_merges_by_name_and_reference() {
        let store = test_store(FixedClock::at_millis(10_000)).await;
        let grace = store.add_keyword("Grace").await.unwrap();
        store
            .add_keyword_material(&grace.id, MaterialDraft::new("Amazing grace"))
            .await
            .unwrap();
        store.add_bible_location("John", "3", "16").await.unwrap();
        let existing_sermon = store.save_sermon(Sermon::new("Kept", "")).await.unwrap();

        let mut location = BibleLocation::new("JOHN", "3", "16");
        location.materials.push(Material::new(MaterialDraft::new("Whosoever")));
        let mut clashing = Sermon::new("Clash", "");
        clashing.id = existing_sermon.id.clone();

        let batch = ImportBatch {
            keywords: vec![
                keyword_with("grace", &["Amazing grace", "Sufficient grace"]),
                keyword_with("Mercy", &[]),
            ],
            bible_locations: vec![location],
            sermons: vec![clashing],
        };
        store.import(batch, ImportMode::Append).await.unwrap();

        let doc = store.snapshot().await.unwrap();
        assert_eq!(doc.keywords.len(), 2);
        assert_eq!(doc.keywords[0].materials.len(), 2);
        assert_eq!(doc.bible_locations.len(), 1);
        assert_eq!(doc.bible_locations[0].materials.len(), 1);
        assert_eq!(doc.sermons.len(), 2);
        assert_ne!(doc.sermons[0].id, doc.sermons[1].id);
    }

    #[tokio::test]
    async fn test_invalid_batch_touches_nothing() {
        let store = test_store(FixedClock::at_millis(10_000)).await;

        assert!(store
            .import(ImportBatch::default(), ImportMode::Replace)
            .await
            .is_err());

        let batch = ImportBatch {
            sermons: vec![Sermon::new(" ", "untitled")],
            ..ImportBatch::default()
        };
        assert!(matches!(
            store.import(batch, ImportMode::Append).await,
            Err(LibraryError::InvalidInput { .. })
        ));
        assert!(!store
            .backup_slot(BackupKind::Import)
            .is_available()
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_restore_import_backup() {
        let clock = FixedClock::at_millis(10_000);
        let store = test_store(clock.clone()).await;
        store.add_keyword("Before import").await.unwrap();
        let before = store.snapshot().await.unwrap();

        clock.set_millis(20_000);
        store
            .import(
                ImportBatch {
                    keywords: vec![keyword_with("After", &[])],
                    ..ImportBatch::default()
                },
                ImportMode::Replace,
            )
            .await
            .unwrap();

        assert_eq!(
            store.restore_import_backup(&Always(false)).await.unwrap(),
            RestoreOutcome::Declined
        );
        assert_eq!(
            store.restore_import_backup(&Always(true)).await.unwrap(),
            RestoreOutcome::Restored {
                last_modified: before.last_modified
            }
        );
        assert_eq!(store.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_import_emits_summary_event() {
        let store = test_store(FixedClock::at_millis(10_000)).await;
        let mut rx = store.event_bus().subscribe();

        store
            .import(
                ImportBatch {
                    bible_locations: vec![BibleLocation::new("Ruth", "1", "16")],
                    ..ImportBatch::default()
                },
                ImportMode::Append,
            )
            .await
            .unwrap();

        let mut imported = None;
        while let Ok(event) = rx.try_recv() {
            if let CoreEvent::Library(LibraryEvent::Imported { mode, bible_locations, .. }) = event {
                imported = Some((mode, bible_locations));
            }
        }
        assert_eq!(imported, Some(("append".to_string(), 1)));
    }

    #[test]
    fn test_batch_parses_exported_document() {
        let batch: ImportBatch = serde_json::from_str(
            r#"{"keywords":[{"id":"1","name":"Joy","materials":[]}],"bibleData":[],"lastModified":"2024-01-01T00:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(batch.keywords[0].name, "Joy");
    }
}
