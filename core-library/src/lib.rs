//! # Library Module
//!
//! Owns the local sermon library: keywords with materials, Bible references
//! with materials, and sermon texts, all persisted as one [`SyncDocument`].
//!
//! ## Overview
//!
//! - Domain models with lenient, forward-compatible JSON ([`models`])
//! - The sync document wire format ([`document`])
//! - CRUD over the host settings store with strictly increasing
//!   `lastModified` ([`LibraryStore`])
//! - Single-slot sync and import backups ([`backup`])
//! - Bulk import in replace or append mode ([`import`])
//! - Substring search ([`query`])

pub mod backup;
pub mod document;
pub mod error;
pub mod import;
pub mod models;
pub mod query;
pub mod store;

pub use backup::{BackupKind, BackupRecord, BackupSlot, RestoreOutcome};
pub use document::SyncDocument;
pub use error::{LibraryError, Result};
pub use import::{ImportBatch, ImportMode, ImportSummary};
pub use models::{BibleLocation, Keyword, Material, MaterialDraft, Sermon};
pub use query::{search_document, SearchResults};
pub use store::LibraryStore;
