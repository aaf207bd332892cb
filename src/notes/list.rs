use indexmap::IndexMap;

use super::{Note, NoteId};

/// Local cache of the notes collection, replaced wholesale by every pushed
/// snapshot. Drafts are never admitted.
#[derive(Debug, Clone, Default)]
pub struct NoteList {
    notes: IndexMap<String, Note>,
}

impl NoteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_snapshot<I>(&mut self, notes: I)
    where
        I: IntoIterator<Item = Note>,
    {
        self.notes.clear();
        for note in notes {
            if let NoteId::Existing(id) = &note.id {
                self.notes.insert(id.clone(), note);
            }
        }
        tracing::debug!(count = self.notes.len(), "applied note snapshot");
    }

    /// Notes by `updated_at`, newest first. Unresolved timestamps sort last;
    /// ties keep snapshot order.
    pub fn sorted_view(&self) -> Vec<&Note> {
        let mut view: Vec<&Note> = self.notes.values().collect();
        view.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        view
    }

    /// Replaces the entry for a note the store just acknowledged.
    pub fn commit(&mut self, note: Note) {
        if let NoteId::Existing(id) = &note.id {
            self.notes.insert(id.clone(), note);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Note> {
        self.notes.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
