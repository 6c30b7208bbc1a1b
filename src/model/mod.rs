use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

mod collection;

pub use collection::NoteCollection;

pub const UNTITLED: &str = "Untitled";

/// Identifier of a note. Locally generated ids are UUIDs; ids adopted from
/// the remote service are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Note {
    /// A fresh local note as produced by the "new note" intent.
    pub fn untitled() -> Self {
        Self::with_contents(NoteId::generate(), UNTITLED, "")
    }

    pub fn with_contents(id: NoteId, title: &str, content: &str) -> Self {
        let now = now_utc();
        Self {
            id,
            title: title.to_owned(),
            content: content.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn welcome() -> Self {
        Self::with_contents(
            NoteId::generate(),
            "Welcome",
            "This is your note space. Notes are kept on this machine and, \
             when a note service is configured, mirrored to it.\n",
        )
    }

    /// Advance `updated_at` to now without ever moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(now_utc());
    }

    pub fn matches(&self, needle_lower: &str) -> bool {
        needle_lower.is_empty()
            || self.title.to_lowercase().contains(needle_lower)
            || self.content.to_lowercase().contains(needle_lower)
    }
}

/// Wall-clock now, truncated to milliseconds so values survive an RFC 3339
/// round trip through the cache and the remote unchanged.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.millisecond() as u32 * 1_000_000)
        .unwrap_or(now)
}
