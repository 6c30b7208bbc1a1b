//! Coercion of loosely shaped service payloads into [`Note`].
//!
//! Field names are looked up camelCase first, then snake_case, then a few
//! common aliases. Unknown fields are ignored. A payload without an id gets a
//! locally generated one instead of being rejected.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::model::{now_utc, Note, NoteId};

const ID_FIELDS: &[&str] = &["id", "_id", "noteId", "note_id", "uuid"];
const TITLE_FIELDS: &[&str] = &["title", "name"];
const CONTENT_FIELDS: &[&str] = &["content", "body", "text"];
const CREATED_FIELDS: &[&str] = &["createdAt", "created_at", "created"];
const UPDATED_FIELDS: &[&str] = &["updatedAt", "updated_at", "updated", "modifiedAt", "modified_at"];

/// Fields a collection response may wrap its array in.
const LIST_WRAPPERS: &[&str] = &["notes", "data", "items", "results"];
/// Fields a single-note response may wrap its object in.
const NOTE_WRAPPERS: &[&str] = &["note", "data"];

/// Accepts a bare array or an object wrapping one under a known field.
/// Anything else is `None`; non-object array entries are skipped.
pub fn notes_from_body(body: &Value) -> Option<Vec<Note>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => LIST_WRAPPERS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array))?,
        _ => return None,
    };
    let notes = items
        .iter()
        .filter_map(|item| {
            let note = note_from_body(item);
            if note.is_none() {
                tracing::warn!("skipping non-object entry in note list");
            }
            note
        })
        .collect();
    Some(notes)
}

/// Coerce a single note payload, unwrapping `{"note": {...}}` style envelopes.
pub fn note_from_body(body: &Value) -> Option<Note> {
    let map = body.as_object()?;
    let map = NOTE_WRAPPERS
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_object))
        .filter(|_| lookup(map, ID_FIELDS).is_none())
        .unwrap_or(map);
    Some(note_from_map(map))
}

fn note_from_map(map: &Map<String, Value>) -> Note {
    let id = lookup(map, ID_FIELDS)
        .and_then(id_from_value)
        .unwrap_or_else(|| {
            let id = NoteId::generate();
            tracing::debug!(note_id = %id, "remote note had no id, synthesised one");
            id
        });
    let title = lookup(map, TITLE_FIELDS).and_then(text).unwrap_or_default();
    let content = lookup(map, CONTENT_FIELDS).and_then(text).unwrap_or_default();
    let created_at = lookup(map, CREATED_FIELDS).and_then(timestamp);
    let updated_at = lookup(map, UPDATED_FIELDS).and_then(timestamp);
    let (created_at, updated_at) = match (created_at, updated_at) {
        (Some(created), Some(updated)) => (created, updated),
        (Some(created), None) => (created, created),
        (None, Some(updated)) => (updated, updated),
        (None, None) => {
            let now = now_utc();
            (now, now)
        }
    };
    Note {
        id,
        title,
        content,
        created_at,
        updated_at,
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| map.get(*name))
        .find(|value| !value.is_null())
}

fn id_from_value(value: &Value) -> Option<NoteId> {
    let raw = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!raw.is_empty()).then(|| NoteId::new(raw))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// RFC 3339 strings, or epoch numbers (milliseconds when large enough to be
/// unambiguous, seconds otherwise).
fn timestamp(value: &Value) -> Option<OffsetDateTime> {
    let parsed = match value {
        Value::String(s) => match OffsetDateTime::parse(s.trim(), &Rfc3339) {
            Ok(ts) => Some(ts),
            Err(_) => s.trim().parse::<i64>().ok().and_then(from_epoch),
        },
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch),
        _ => None,
    }?;
    let millis = parsed.millisecond() as u32;
    parsed.replace_nanosecond(millis * 1_000_000).ok()
}

fn from_epoch(raw: i64) -> Option<OffsetDateTime> {
    const MILLIS_THRESHOLD: i64 = 100_000_000_000;
    if raw.abs() >= MILLIS_THRESHOLD {
        OffsetDateTime::from_unix_timestamp_nanos(raw as i128 * 1_000_000).ok()
    } else {
        OffsetDateTime::from_unix_timestamp(raw).ok()
    }
}
