use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;
use crate::model::{Note, NoteId};

mod schema;

pub const NOTES_KEY: &str = "notesync.notes.v1";
pub const SELECTED_KEY: &str = "notesync.selected.v1";

/// Minimal string key/value persistence. Implementations report failures;
/// [`NoteCache`] decides what to do with them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed store. Each call opens its own connection so the handle is
/// cheap to clone and share.
#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl KeyValueStore for StorageHandle {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("reading key {key}"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key {key}"))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("removing key {key}"))?;
            Ok(())
        })
    }
}

/// Process-local store for `--ephemeral` sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Durable cache of the note collection and the selected note id.
///
/// Every method is infallible from the caller's point of view: missing keys,
/// corrupt JSON and store errors all degrade to "nothing cached" and are only
/// logged. The cache is an optimisation, never a hard dependency.
#[derive(Clone)]
pub struct NoteCache {
    store: Arc<dyn KeyValueStore>,
}

impl NoteCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn load(&self) -> Vec<Note> {
        let raw = match self.store.get(NOTES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(?err, "note cache unreadable, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<Note>>(&raw) {
            Ok(notes) => notes,
            Err(err) => {
                tracing::warn!(?err, "note cache corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// True until a collection has been written, even an empty one. An
    /// unreadable store counts as never written.
    pub fn is_first_run(&self) -> bool {
        !matches!(self.store.get(NOTES_KEY), Ok(Some(_)))
    }

    pub fn save(&self, notes: &[Note]) {
        let json = match serde_json::to_string(notes) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(?err, "failed to serialise note cache");
                return;
            }
        };
        if let Err(err) = self.store.set(NOTES_KEY, &json) {
            tracing::warn!(?err, count = notes.len(), "failed to write note cache");
        }
    }

    pub fn load_selection(&self) -> Option<NoteId> {
        match self.store.get(SELECTED_KEY) {
            Ok(Some(raw)) if !raw.trim().is_empty() => Some(NoteId::new(raw)),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(?err, "selection cache unreadable");
                None
            }
        }
    }

    pub fn save_selection(&self, id: Option<&NoteId>) {
        let result = match id {
            Some(id) => self.store.set(SELECTED_KEY, id.as_str()),
            None => self.store.remove(SELECTED_KEY),
        };
        if let Err(err) = result {
            tracing::warn!(?err, "failed to write selection cache");
        }
    }
}

pub fn init(storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
