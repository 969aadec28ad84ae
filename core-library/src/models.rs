//! Domain models for the sermon library
//!
//! Field names follow the camelCase JSON used by the shared Drive document.
//! Every model keeps unknown fields in `extra` so a document written by a
//! newer client survives a round trip through this one.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fresh identifier for a new entity.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Accept `"3"`, `3`, `3.0` or `null` where a string is expected.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

pub(crate) fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_string(deserializer)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// A quotation or note filed under a keyword or Bible reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(default = "new_id", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
    /// Book, author or URL the material came from
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Material {
    pub fn new(draft: MaterialDraft) -> Self {
        Self {
            id: new_id(),
            content: draft.content,
            source: draft.source,
            note: draft.note,
            extra: Map::new(),
        }
    }

    pub(crate) fn matches(&self, needle: &str) -> bool {
        contains_folded(&self.content, needle)
            || contains_folded(&self.source, needle)
            || contains_folded(&self.note, needle)
    }
}

/// Caller-supplied fields of a new material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDraft {
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub note: String,
}

impl MaterialDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("Material content cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Topic keyword with its materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    #[serde(default = "new_id", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keyword {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            materials: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Keyword name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Bible reference with its materials.
///
/// Chapter and verse are kept as text: older documents carry them as numbers,
/// and ranges such as `16-18` are legitimate verses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleLocation {
    #[serde(default = "new_id", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub book: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub chapter: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub verse: String,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BibleLocation {
    pub fn new(
        book: impl Into<String>,
        chapter: impl Into<String>,
        verse: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            book: book.into(),
            chapter: chapter.into(),
            verse: verse.into(),
            materials: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Display form, e.g. `John 3:16` or `Psalms 23`
    pub fn reference(&self) -> String {
        let book = self.book.trim();
        let chapter = self.chapter.trim();
        let verse = self.verse.trim();
        match (chapter.is_empty(), verse.is_empty()) {
            (true, _) => book.to_string(),
            (false, true) => format!("{} {}", book, chapter),
            (false, false) => format!("{} {}:{}", book, chapter, verse),
        }
    }

    /// Same book, chapter and verse, ignoring case and padding
    pub fn same_reference(&self, other: &BibleLocation) -> bool {
        self.reference().to_lowercase() == other.reference().to_lowercase()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.book.trim().is_empty() {
            return Err("Bible book cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A full sermon text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sermon {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    /// Main passage, free text
    #[serde(default, deserialize_with = "lenient_string")]
    pub scripture: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
    /// Preaching date as entered by the user
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sermon {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            scripture: String::new(),
            content: content.into(),
            date: None,
            extra: Map::new(),
        }
    }

    pub fn with_scripture(mut self, scripture: impl Into<String>) -> Self {
        self.scripture = scripture.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Sermon title cannot be empty".to_string());
        }
        Ok(())
    }
}

pub(crate) fn contains_folded(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}
