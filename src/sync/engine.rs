use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SyncOptions;
use crate::model::{Note, NoteCollection, NoteId};
use crate::remote::{RemoteOutcome, RemoteResult};
use crate::search::SearchFilter;
use crate::storage::NoteCache;

use super::debounce::DebounceTable;
use super::status::{SyncPhase, SyncStatus};

/// Source of monotonic time for debounce and status deadlines.
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Instant::now)
}

/// Where the presentation layer should move input focus next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Title,
}

/// Network work the engine wants performed. The caller executes it and
/// reports back with the matching [`RemoteCompletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    FetchAll,
    Create {
        local_id: NoteId,
        title: String,
        content: String,
    },
    Update {
        id: NoteId,
        title: String,
        content: String,
    },
    /// Carries the removed note and its former position for rollback.
    Delete { note: Note, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCompletion {
    Fetched(RemoteResult<Vec<Note>>),
    Created {
        local_id: NoteId,
        title: String,
        content: String,
        result: RemoteResult<Note>,
    },
    /// Echoes the text that was sent so stale replies can be recognised.
    Updated {
        id: NoteId,
        title: String,
        content: String,
        result: RemoteResult<Note>,
    },
    Deleted {
        note: Note,
        index: usize,
        result: RemoteResult<()>,
    },
}

/// Owner of the canonical note collection, the selection and the sync status.
///
/// Every mutation is applied locally first and written to the cache before
/// any network work is requested. Remote results come back through
/// [`SyncEngine::complete`] and are merged by note id, so replies for notes
/// that no longer exist are dropped.
pub struct SyncEngine {
    notes: NoteCollection,
    selection: Option<NoteId>,
    status: SyncStatus,
    dirty: bool,
    search: SearchFilter,
    focus: Option<FocusTarget>,
    cache: NoteCache,
    saves: DebounceTable,
    saved_linger: Duration,
    revert_at: Option<Instant>,
    started: bool,
    clock: Clock,
}

impl SyncEngine {
    /// Load the cached collection and selection. A cache that has never held
    /// a collection is seeded with a single welcome note.
    pub fn open(cache: NoteCache, options: &SyncOptions) -> Self {
        let mut notes = NoteCollection::from_notes(cache.load());
        let seeded = notes.is_empty() && cache.is_first_run();
        if seeded {
            tracing::info!("seeding welcome note");
            notes.prepend(Note::welcome());
        }
        let selection = cache.load_selection();
        let mut engine = Self {
            notes,
            selection,
            status: SyncStatus::idle(),
            dirty: false,
            search: SearchFilter::default(),
            focus: None,
            cache,
            saves: DebounceTable::new(options.debounce()),
            saved_linger: options.saved_linger(),
            revert_at: None,
            started: false,
            clock: system_clock(),
        };
        if seeded {
            engine.persist_notes();
        }
        engine.reconcile_selection();
        engine
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn notes(&self) -> &NoteCollection {
        &self.notes
    }

    /// Notes in display order with the search filter applied.
    pub fn visible_notes(&self) -> Vec<&Note> {
        self.search.apply(&self.notes)
    }

    pub fn selected_id(&self) -> Option<&NoteId> {
        self.selection.as_ref()
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selection.as_ref().and_then(|id| self.notes.get(id))
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn search_query(&self) -> &str {
        self.search.query()
    }

    pub fn has_pending_saves(&self) -> bool {
        !self.saves.is_empty()
    }

    pub fn take_focus_request(&mut self) -> Option<FocusTarget> {
        self.focus.take()
    }

    /// Earliest instant at which [`SyncEngine::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let revert = self
            .revert_at
            .filter(|_| self.status.phase() == SyncPhase::Saved);
        match (self.saves.next_deadline(), revert) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Startup reconciliation. Only the first call in a session returns work.
    pub fn start_sync(&mut self) -> Option<RemoteRequest> {
        if self.started {
            return None;
        }
        self.started = true;
        self.status = SyncStatus::syncing();
        tracing::debug!("fetching notes from remote");
        Some(RemoteRequest::FetchAll)
    }

    pub fn create_note(&mut self) -> RemoteRequest {
        self.begin_intent();
        let note = Note::untitled();
        let request = RemoteRequest::Create {
            local_id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
        };
        let id = note.id.clone();
        tracing::info!(note_id = %id, "created local note");
        self.notes.prepend(note);
        self.persist_notes();
        self.switch_selection(Some(id));
        self.search.clear();
        self.focus = Some(FocusTarget::Title);
        self.status = SyncStatus::saving();
        request
    }

    /// Apply a title edit to the selected note. Returns false when nothing is
    /// selected.
    pub fn edit_title(&mut self, title: &str) -> bool {
        self.edit_selected(|note| {
            note.title.clear();
            note.title.push_str(title);
        })
    }

    pub fn edit_content(&mut self, content: &str) -> bool {
        self.edit_selected(|note| {
            note.content.clear();
            note.content.push_str(content);
        })
    }

    /// Explicit save: skip the quiet period and push the selected note now.
    pub fn save_now(&mut self) -> Option<RemoteRequest> {
        self.begin_intent();
        let id = self.selection.clone()?;
        self.saves.cancel(&id);
        self.issue_update(&id)
    }

    /// Select a note. Unknown ids are ignored and return false.
    pub fn select(&mut self, id: &NoteId) -> bool {
        if !self.notes.contains(id) {
            return false;
        }
        self.begin_intent();
        self.switch_selection(Some(id.clone()));
        true
    }

    /// Delete a note the user has already confirmed.
    pub fn delete_note(&mut self, id: &NoteId) -> Option<RemoteRequest> {
        self.begin_intent();
        let (index, note) = self.notes.remove(id)?;
        self.saves.cancel(id);
        if self.selection.as_ref() == Some(id) {
            self.dirty = false;
        }
        tracing::info!(note_id = %id, "deleted note locally");
        self.persist_notes();
        self.status = SyncStatus::saving();
        Some(RemoteRequest::Delete { note, index })
    }

    pub fn set_search(&mut self, query: &str) {
        self.search.set(query);
    }

    /// Fire due debounced saves and expire the "saved" status.
    pub fn tick(&mut self) -> Vec<RemoteRequest> {
        let now = (self.clock)();
        let requests = self
            .saves
            .take_due(now)
            .into_iter()
            .filter_map(|id| self.issue_update(&id))
            .collect();
        if self.status.phase() == SyncPhase::Saved
            && self.revert_at.is_some_and(|at| at <= now)
        {
            self.status = SyncStatus::idle();
            self.revert_at = None;
        }
        requests
    }

    pub fn complete(&mut self, completion: RemoteCompletion) {
        match completion {
            RemoteCompletion::Fetched(result) => self.on_fetched(result),
            RemoteCompletion::Created {
                local_id,
                title,
                content,
                result,
            } => self.on_created(local_id, &title, &content, result),
            RemoteCompletion::Updated {
                id,
                title,
                content,
                result,
            } => self.on_updated(id, &title, &content, result),
            RemoteCompletion::Deleted {
                note,
                index,
                result,
            } => self.on_deleted(note, index, result),
        }
    }

    fn on_fetched(&mut self, result: RemoteResult<Vec<Note>>) {
        match result {
            Ok(RemoteOutcome::Value(notes)) => {
                tracing::info!(count = notes.len(), "replacing local notes with remote copy");
                self.notes = NoteCollection::from_notes(notes);
                self.persist_notes();
                if self.status.phase() == SyncPhase::Syncing {
                    self.mark_saved();
                }
            }
            Ok(RemoteOutcome::Unconfigured) => {
                tracing::info!("no note service configured, working locally");
                self.settle_syncing();
            }
            Ok(RemoteOutcome::Unavailable) => {
                tracing::info!("note service unavailable, keeping local notes");
                self.settle_syncing();
            }
            Err(err) => {
                tracing::warn!(%err, "startup sync failed, keeping local notes");
                self.settle_syncing();
            }
        }
    }

    fn on_created(
        &mut self,
        local_id: NoteId,
        sent_title: &str,
        sent_content: &str,
        result: RemoteResult<Note>,
    ) {
        let mut server = match result {
            Ok(RemoteOutcome::Value(note)) => note,
            Ok(_) => {
                self.mark_saved();
                return;
            }
            Err(err) => {
                tracing::warn!(note_id = %local_id, %err, "remote create failed");
                self.fail(err.to_string());
                return;
            }
        };
        let Some(local) = self.notes.get(&local_id) else {
            tracing::debug!(note_id = %local_id, "dropping create reply for a removed note");
            self.mark_saved();
            return;
        };

        let edited_since = local.title != sent_title || local.content != sent_content;
        if edited_since {
            server.title = local.title.clone();
            server.content = local.content.clone();
            server.updated_at = server.updated_at.max(local.updated_at);
        }
        let server_id = server.id.clone();
        let still_selected = self.selection.as_ref() == Some(&local_id);
        self.notes.replace(&local_id, server);
        self.saves.rekey(&local_id, server_id.clone());
        // Leaving the note dropped its pending save; only push edits that are
        // still being worked on.
        if edited_since && still_selected && !self.saves.is_pending(&server_id) {
            self.saves.schedule(server_id.clone(), (self.clock)());
        }
        tracing::info!(local_id = %local_id, note_id = %server_id, "adopted server id");
        if still_selected {
            self.set_selection(Some(server_id));
        }
        self.persist_notes();
        self.mark_saved();
    }

    fn on_updated(
        &mut self,
        id: NoteId,
        sent_title: &str,
        sent_content: &str,
        result: RemoteResult<Note>,
    ) {
        // A reply is current only if nothing was typed since the request went
        // out, either still waiting in the debounce table or already applied.
        let current = !self.saves.is_pending(&id)
            && self
                .notes
                .get(&id)
                .is_some_and(|note| note.title == sent_title && note.content == sent_content);
        match result {
            Ok(RemoteOutcome::Value(server)) => {
                if !self.notes.contains(&id) {
                    tracing::debug!(note_id = %id, "dropping update reply for a removed note");
                } else if !current {
                    tracing::debug!(note_id = %id, "stale update reply, keeping local fields");
                } else if let Some(note) = self.notes.get_mut(&id) {
                    note.title = server.title;
                    note.content = server.content;
                    note.updated_at = note.updated_at.max(server.updated_at);
                    self.persist_notes();
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(note_id = %id, %err, "remote update failed");
                self.fail(err.to_string());
                return;
            }
        }
        if current && self.selection.as_ref() == Some(&id) {
            self.dirty = false;
        }
        self.mark_saved();
    }

    fn on_deleted(&mut self, note: Note, index: usize, result: RemoteResult<()>) {
        match result {
            Ok(_) => self.mark_saved(),
            Err(err) => {
                tracing::warn!(note_id = %note.id, %err, "remote delete failed, restoring note");
                let id = note.id.clone();
                self.notes.insert_at(index, note);
                self.persist_notes();
                self.switch_selection(Some(id));
                self.fail(err.to_string());
            }
        }
    }

    fn edit_selected(&mut self, apply: impl FnOnce(&mut Note)) -> bool {
        let Some(id) = self.selection.clone() else {
            return false;
        };
        let Some(note) = self.notes.get_mut(&id) else {
            return false;
        };
        apply(note);
        note.touch();
        self.begin_intent();
        self.dirty = true;
        self.persist_notes();
        self.saves.schedule(id, (self.clock)());
        true
    }

    fn issue_update(&mut self, id: &NoteId) -> Option<RemoteRequest> {
        let note = self.notes.get(id)?;
        let request = RemoteRequest::Update {
            id: id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
        };
        if !self.status.is_error() {
            self.status = SyncStatus::saving();
        }
        Some(request)
    }

    /// User intents clear a standing error.
    fn begin_intent(&mut self) {
        if self.status.is_error() {
            self.status = SyncStatus::idle();
        }
    }

    fn mark_saved(&mut self) {
        if self.status.is_error() {
            return;
        }
        self.status = SyncStatus::saved();
        self.revert_at = Some((self.clock)() + self.saved_linger);
    }

    fn settle_syncing(&mut self) {
        if self.status.phase() == SyncPhase::Syncing {
            self.status = SyncStatus::idle();
        }
    }

    fn fail(&mut self, message: String) {
        self.status = SyncStatus::error(message);
        self.revert_at = None;
    }

    fn persist_notes(&mut self) {
        self.cache.save(&self.notes.to_vec());
        self.reconcile_selection();
    }

    /// Keep the selection if it still exists, else fall back to the newest
    /// note, else nothing.
    fn reconcile_selection(&mut self) {
        let keep = self
            .selection
            .as_ref()
            .is_some_and(|id| self.notes.contains(id));
        if !keep {
            let fallback = self.notes.first_sorted_id();
            self.set_selection(fallback);
        }
    }

    /// Selection change driven by the user: a pending save for the note
    /// being left is dropped without flushing.
    fn switch_selection(&mut self, next: Option<NoteId>) {
        if let Some(current) = self.selection.clone() {
            if next.as_ref() != Some(&current) {
                if self.saves.cancel(&current) {
                    tracing::debug!(note_id = %current, "dropped pending save on selection change");
                }
                self.dirty = false;
            }
        }
        self.set_selection(next);
    }

    fn set_selection(&mut self, next: Option<NoteId>) {
        if self.selection == next {
            return;
        }
        self.selection = next;
        self.cache.save_selection(self.selection.as_ref());
    }
}
