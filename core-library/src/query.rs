//! Library search.
//!
//! Case-insensitive substring match over keyword names, Bible references,
//! material text and sermon title, scripture and content.

use crate::document::SyncDocument;
use crate::error::Result;
use crate::models::{contains_folded, BibleLocation, Keyword, Sermon};
use crate::store::LibraryStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub keywords: Vec<Keyword>,
    pub bible_locations: Vec<BibleLocation>,
    pub sermons: Vec<Sermon>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.bible_locations.is_empty() && self.sermons.is_empty()
    }

    pub fn total(&self) -> usize {
        self.keywords.len() + self.bible_locations.len() + self.sermons.len()
    }
}

/// Search a document in memory. A blank query matches nothing.
pub fn search_document(document: &SyncDocument, query: &str) -> SearchResults {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchResults::default();
    }

    SearchResults {
        keywords: document
            .keywords
            .iter()
            .filter(|k| contains_folded(&k.name, &needle) || k.materials.iter().any(|m| m.matches(&needle)))
            .cloned()
            .collect(),
        bible_locations: document
            .bible_locations
            .iter()
            .filter(|b| {
                contains_folded(&b.reference(), &needle) || b.materials.iter().any(|m| m.matches(&needle))
            })
            .cloned()
            .collect(),
        sermons: document
            .sermons
            .iter()
            .filter(|s| {
                contains_folded(&s.title, &needle)
                    || contains_folded(&s.scripture, &needle)
                    || contains_folded(&s.content, &needle)
            })
            .cloned()
            .collect(),
    }
}

impl LibraryStore {
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        Ok(search_document(&self.snapshot().await?, query))
    }
}
