use indexmap::IndexMap;

use super::{Note, NoteId};

/// The canonical note set. Keys are unique by construction; iteration order
/// is insertion order, which is also the tie-breaker for the display sort.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteCollection {
    notes: IndexMap<NoteId, Note>,
}

impl NoteCollection {
    /// Build a collection from an untrusted sequence (cache or remote).
    /// Notes with a blank id are dropped and the first occurrence of a
    /// duplicated id wins.
    pub fn from_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut map = IndexMap::new();
        for note in notes {
            if note.id.is_empty() {
                tracing::warn!("dropping note without an id");
                continue;
            }
            if map.contains_key(&note.id) {
                tracing::warn!(note_id = %note.id, "dropping duplicate note id");
                continue;
            }
            map.insert(note.id.clone(), note);
        }
        Self { notes: map }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.notes.contains_key(id)
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn get_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        self.notes.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn prepend(&mut self, note: Note) {
        self.insert_at(0, note);
    }

    /// Insert at `index` (clamped), replacing any note that already uses the id.
    pub fn insert_at(&mut self, index: usize, note: Note) {
        self.notes.shift_remove(&note.id);
        let index = index.min(self.notes.len());
        self.notes.shift_insert(index, note.id.clone(), note);
    }

    /// Remove a note, returning its former position so it can be restored.
    pub fn remove(&mut self, id: &NoteId) -> Option<(usize, Note)> {
        self.notes
            .shift_remove_full(id)
            .map(|(index, _, note)| (index, note))
    }

    /// Swap the note stored under `old` for `replacement`, keeping its
    /// position. Returns false when `old` is no longer present.
    pub fn replace(&mut self, old: &NoteId, replacement: Note) -> bool {
        let Some((index, _)) = self.remove(old) else {
            return false;
        };
        self.insert_at(index, replacement);
        true
    }

    /// Notes ordered by `updated_at` descending; equal timestamps keep
    /// insertion order.
    pub fn sorted(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    /// Sorted notes whose title or content contains `query`, ignoring case.
    pub fn filtered(&self, query: &str) -> Vec<&Note> {
        let needle = query.trim().to_lowercase();
        self.sorted()
            .into_iter()
            .filter(|note| note.matches(&needle))
            .collect()
    }

    pub fn first_sorted_id(&self) -> Option<NoteId> {
        self.sorted().first().map(|note| note.id.clone())
    }

    pub fn to_vec(&self) -> Vec<Note> {
        self.notes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn note(id: &str, title: &str, content: &str) -> Note {
        Note::with_contents(NoteId::new(id), title, content)
    }

    #[test]
    fn from_notes_drops_blank_and_duplicate_ids() {
        let first = note("a", "First", "");
        let mut dup = note("a", "Second", "");
        dup.content = "ignored".into();
        let blank = note("  ", "Blank", "");
        let collection = NoteCollection::from_notes(vec![first.clone(), dup, blank]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(&NoteId::new("a")), Some(&first));
    }

    #[test]
    fn sorted_is_newest_first_with_insertion_tie_break() {
        let base = note("base", "", "");
        let mut older = note("older", "", "");
        older.updated_at = base.updated_at - Duration::minutes(5);
        let mut tie_a = note("tie-a", "", "");
        tie_a.updated_at = base.updated_at;
        let mut tie_b = note("tie-b", "", "");
        tie_b.updated_at = base.updated_at;

        let collection = NoteCollection::from_notes(vec![older, tie_a, tie_b]);
        let ids: Vec<&str> = collection.sorted().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["tie-a", "tie-b", "older"]);
    }

    #[test]
    fn filtered_matches_title_or_content_ignoring_case() {
        let mut alpha = note("1", "Alpha", "");
        let mut beta = note("2", "Beta", "");
        let mut inside = note("3", "Gamma", "has beta inside");
        let now = alpha.updated_at;
        alpha.updated_at = now - Duration::seconds(3);
        beta.updated_at = now - Duration::seconds(2);
        inside.updated_at = now - Duration::seconds(1);
        let collection = NoteCollection::from_notes(vec![alpha, beta, inside]);

        let hits: Vec<&str> = collection.filtered("beta").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(hits, vec!["3", "2"]);

        let all: Vec<&str> = collection.filtered("").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(all, vec!["3", "2", "1"]);
    }

    #[test]
    fn replace_keeps_position_and_remove_reports_it() {
        let mut collection =
            NoteCollection::from_notes(vec![note("a", "", ""), note("b", "", ""), note("c", "", "")]);
        assert!(collection.replace(&NoteId::new("b"), note("server-b", "", "")));
        let ids: Vec<&str> = collection.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "server-b", "c"]);

        let (index, removed) = collection.remove(&NoteId::new("server-b")).expect("present");
        assert_eq!(index, 1);
        collection.insert_at(index, removed);
        let ids: Vec<&str> = collection.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "server-b", "c"]);

        assert!(!collection.replace(&NoteId::new("missing"), note("x", "", "")));
    }
}
