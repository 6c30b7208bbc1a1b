use crate::model::{Note, NoteCollection};

/// Free-text filter applied to the visible note list. Matching is a
/// case-insensitive substring test against title and content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    query: String,
}

impl SearchFilter {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn set(&mut self, query: &str) {
        self.query.clear();
        self.query.push_str(query);
    }

    pub fn clear(&mut self) {
        self.query.clear();
    }

    pub fn apply<'a>(&self, notes: &'a NoteCollection) -> Vec<&'a Note> {
        if self.is_active() {
            notes.filtered(&self.query)
        } else {
            notes.sorted()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteId;

    #[test]
    fn blank_query_is_inactive_and_returns_everything() {
        let notes = NoteCollection::from_notes(vec![
            Note::with_contents(NoteId::new("a"), "One", ""),
            Note::with_contents(NoteId::new("b"), "Two", ""),
        ]);
        let filter = SearchFilter::new("   ");
        assert!(!filter.is_active());
        assert_eq!(filter.apply(&notes).len(), 2);
    }

    #[test]
    fn query_is_trimmed_and_case_folded() {
        let notes = NoteCollection::from_notes(vec![
            Note::with_contents(NoteId::new("a"), "Groceries", "milk"),
            Note::with_contents(NoteId::new("b"), "Ideas", "MILKSHAKE bar"),
            Note::with_contents(NoteId::new("c"), "Todo", "call bank"),
        ]);
        let mut filter = SearchFilter::default();
        filter.set("  Milk ");
        assert!(filter.is_active());
        let mut ids: Vec<&str> = filter.apply(&notes).iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);

        filter.clear();
        assert_eq!(filter.query(), "");
    }
}
