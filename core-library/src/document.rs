//! The synchronized document: the whole library plus its modification time.
//!
//! Wire shape (shared with the Drive file and the backup slots):
//!
//! ```json
//! {
//!   "keywords": [...],
//!   "bibleData": [...],
//!   "sermons": [...],
//!   "lastModified": "2024-05-01T10:00:00.000Z"
//! }
//! ```

use crate::error::Result;
use crate::models::{BibleLocation, Keyword, Sermon};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unix epoch, the timestamp of a document that was never written.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Parse a stored or remote timestamp.
///
/// Accepts RFC 3339 strings and Unix milliseconds. Anything else, including
/// a missing value, is the epoch so an unreadable stamp always loses the
/// comparison.
pub fn parse_timestamp(value: &Value) -> DateTime<Utc> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            })
            .unwrap_or_else(epoch),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(epoch),
        _ => epoch(),
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_timestamp(&Value::deserialize(deserializer)?))
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

/// The three collections and the ordering key used for conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default, rename = "bibleData")]
    pub bible_locations: Vec<BibleLocation>,
    #[serde(default)]
    pub sermons: Vec<Sermon>,
    #[serde(
        default = "epoch",
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub last_modified: DateTime<Utc>,
}

impl Default for SyncDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl SyncDocument {
    /// No collections, stamped at the epoch
    pub fn empty() -> Self {
        Self {
            keywords: Vec::new(),
            bible_locations: Vec::new(),
            sermons: Vec::new(),
            last_modified: epoch(),
        }
    }

    /// Decode a remote body. A blank body is the empty document.
    pub fn from_remote_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty());
        }
        Ok(serde_json::from_slice(body)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn last_modified_millis(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.bible_locations.is_empty() && self.sermons.is_empty()
    }

    /// Total number of materials across keywords and Bible locations
    pub fn material_count(&self) -> usize {
        self.keywords
            .iter()
            .map(|k| k.materials.len())
            .chain(self.bible_locations.iter().map(|b| b.materials.len()))
            .sum()
    }
}
