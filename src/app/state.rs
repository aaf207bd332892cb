use unicode_segmentation::UnicodeSegmentation;

use crate::notes::{
    DeleteChoice, DeleteOutcome, DeletePrompt, DeleteRequest, EditorError, Note, NoteEditor,
    NoteList, NoteRepository,
};

/// Which half of the open note receives typed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorField {
    #[default]
    Title,
    Content,
}

#[derive(Debug)]
pub struct AppState {
    list: NoteList,
    editor: NoteEditor,
    selected: usize,
    selected_id: Option<String>,
    field: EditorField,
    columns: usize,
    preview_lines: usize,
    confirm_delete: bool,
    status_message: Option<String>,
}

impl AppState {
    pub fn new(columns: u16, preview_lines: u16, confirm_delete: bool) -> Self {
        Self {
            list: NoteList::new(),
            editor: NoteEditor::new(),
            selected: 0,
            selected_id: None,
            field: EditorField::Title,
            columns: usize::from(columns.max(1)),
            preview_lines: usize::from(preview_lines),
            confirm_delete,
            status_message: None,
        }
    }

    pub fn list(&self) -> &NoteList {
        &self.list
    }

    pub fn editor(&self) -> &NoteEditor {
        &self.editor
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn preview_lines(&self) -> usize {
        self.preview_lines
    }

    pub fn field(&self) -> EditorField {
        self.field
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_open()
    }

    pub fn pending_delete(&self) -> Option<&DeletePrompt> {
        self.editor.pending_delete()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    /// Cards in display order: newest first.
    pub fn cards(&self) -> Vec<&Note> {
        self.list.sorted_view()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.cards().get(self.selected).copied()
    }

    /// Replaces the list with a pushed snapshot, keeping the selection on
    /// the same note when it survived.
    pub fn apply_snapshot(&mut self, notes: Vec<Note>) {
        self.list.apply_snapshot(notes);
        self.reselect();
    }

    fn reselect(&mut self) {
        let position = self.selected_id.as_deref().and_then(|id| {
            self.cards()
                .iter()
                .position(|note| note.id.existing() == Some(id))
        });
        match position {
            Some(idx) => self.selected = idx,
            None => self.normalize_selection(),
        }
    }

    fn normalize_selection(&mut self) {
        let len = self.list.len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
        self.selected_id = self.selected_card_id();
    }

    fn selected_card_id(&self) -> Option<String> {
        self.selected_note()
            .and_then(|note| note.id.existing())
            .map(str::to_owned)
    }

    /// Moves through the card grid. Horizontal steps wrap between rows;
    /// vertical steps jump a full row.
    pub fn move_selection(&mut self, dx: isize, dy: isize) {
        let len = self.list.len();
        if len == 0 {
            return;
        }
        let delta = dx + dy * self.columns as isize;
        let next = (self.selected as isize + delta).clamp(0, len as isize - 1);
        self.selected = next as usize;
        self.selected_id = self.selected_card_id();
    }

    pub fn open_selected(&mut self) -> bool {
        let Some(note) = self.selected_note().cloned() else {
            return false;
        };
        self.editor.open_existing(&note);
        self.field = EditorField::Title;
        self.status_message = None;
        true
    }

    pub fn open_new(&mut self) {
        self.editor.open_new();
        self.field = EditorField::Title;
        self.set_status_message(Some("New note: Ctrl-s saves, Esc discards"));
    }

    pub fn close_editor(&mut self) {
        self.editor.close();
        self.field = EditorField::Title;
    }

    pub fn toggle_field(&mut self) {
        self.field = match self.field {
            EditorField::Title => EditorField::Content,
            EditorField::Content => EditorField::Title,
        };
    }

    fn field_text(&self) -> Option<&str> {
        self.editor.draft().map(|draft| match self.field {
            EditorField::Title => draft.title.as_str(),
            EditorField::Content => draft.content.as_str(),
        })
    }

    fn replace_field_text(&mut self, text: String) {
        match self.field {
            EditorField::Title => self.editor.set_title(text),
            EditorField::Content => self.editor.set_content(text),
        }
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        let Some(current) = self.field_text() else {
            return false;
        };
        let mut text = current.to_owned();
        text.push(ch);
        self.replace_field_text(text);
        true
    }

    /// Titles are single-line, so Enter there moves on to the content.
    pub fn insert_newline(&mut self) -> bool {
        match self.field {
            EditorField::Title => {
                if self.is_editing() {
                    self.field = EditorField::Content;
                }
                false
            }
            EditorField::Content => self.insert_char('\n'),
        }
    }

    pub fn backspace(&mut self) -> bool {
        let Some(current) = self.field_text() else {
            return false;
        };
        let Some((idx, _)) = current.grapheme_indices(true).next_back() else {
            return false;
        };
        let text = current[..idx].to_owned();
        self.replace_field_text(text);
        true
    }

    pub fn save(&mut self, repo: &NoteRepository) -> Result<Note, EditorError> {
        let committed = self.editor.save(repo, &mut self.list)?;
        self.selected_id = committed.id.existing().map(str::to_owned);
        self.reselect();
        self.field = EditorField::Title;
        self.set_status_message(Some("Saved"));
        Ok(committed)
    }

    /// Starts a delete of the open note. When confirmation is turned off
    /// the delete goes through straight away.
    pub fn request_delete(&mut self, repo: &NoteRepository) -> Result<DeleteRequest, EditorError> {
        let request = self.editor.request_delete();
        match &request {
            DeleteRequest::Suppressed => {
                self.set_status_message(Some("Nothing to delete: this note was never saved"));
            }
            DeleteRequest::Prompt(_) if !self.confirm_delete => {
                self.resolve_delete(DeleteChoice::Confirm, repo)?;
            }
            DeleteRequest::Prompt(_) => {}
        }
        Ok(request)
    }

    pub fn resolve_delete(
        &mut self,
        choice: DeleteChoice,
        repo: &NoteRepository,
    ) -> Result<DeleteOutcome, EditorError> {
        let outcome = self.editor.resolve_delete(choice, repo, &mut self.list)?;
        match &outcome {
            DeleteOutcome::Deleted { .. } => {
                self.field = EditorField::Title;
                self.normalize_selection();
                self.set_status_message(Some("Note deleted"));
            }
            DeleteOutcome::Cancelled => self.set_status_message(Some("Delete canceled")),
            DeleteOutcome::NothingPending => {}
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::repository::DEFAULT_COLLECTION;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn memory_repo() -> (Arc<MemoryStore>, NoteRepository) {
        let store = Arc::new(MemoryStore::new());
        let repo = NoteRepository::new(store.clone(), DEFAULT_COLLECTION);
        (store, repo)
    }

    fn type_text(state: &mut AppState, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                state.insert_newline();
            } else {
                state.insert_char(ch);
            }
        }
    }

    #[test]
    fn typing_fills_title_then_content() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, true);
        state.open_new();
        type_text(&mut state, "Groceries\n- milk\n- eggs");
        state.backspace();
        type_text(&mut state, "s!");

        let saved = state.save(&repo)?;
        assert_eq!(saved.title, "Groceries");
        assert_eq!(saved.content, "- milk\n- eggs!");
        assert!(!state.is_editing());
        assert_eq!(state.selected_note().map(|n| n.id.clone()), Some(saved.id));
        Ok(())
    }

    #[test]
    fn backspace_removes_whole_graphemes() {
        let mut state = AppState::new(2, 4, true);
        state.open_new();
        type_text(&mut state, "cafe\u{301}");
        assert!(state.backspace());
        assert_eq!(state.editor().draft().map(|d| d.title.as_str()), Some("caf"));
    }

    #[test]
    fn selection_follows_note_across_snapshots() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, true);
        repo.create("first", "")?;
        repo.create("second", "")?;
        state.apply_snapshot(repo.fetch_all()?);

        state.move_selection(1, 0);
        assert_eq!(state.selected_note().map(|n| n.title.as_str()), Some("first"));

        repo.create("third", "")?;
        state.apply_snapshot(repo.fetch_all()?);
        assert_eq!(state.selected_index(), 2);
        assert_eq!(state.selected_note().map(|n| n.title.as_str()), Some("first"));
        Ok(())
    }

    #[test]
    fn vertical_moves_jump_a_row_and_clamp() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, true);
        for title in ["a", "b", "c"] {
            repo.create(title, "")?;
        }
        state.apply_snapshot(repo.fetch_all()?);
        state.move_selection(0, 1);
        assert_eq!(state.selected_index(), 2);
        state.move_selection(0, 1);
        assert_eq!(state.selected_index(), 2);
        state.move_selection(-5, 0);
        assert_eq!(state.selected_index(), 0);
        Ok(())
    }

    #[test]
    fn delete_without_confirmation_removes_note() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, false);
        repo.create("doomed", "")?;
        state.apply_snapshot(repo.fetch_all()?);
        assert!(state.open_selected());

        let request = state.request_delete(&repo)?;
        assert_matches!(request, DeleteRequest::Prompt(_));
        assert!(state.list().is_empty());
        assert!(!state.is_editing());
        assert!(repo.fetch_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn cancelled_delete_keeps_editor_open() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, true);
        repo.create("kept", "")?;
        state.apply_snapshot(repo.fetch_all()?);
        state.open_selected();

        state.request_delete(&repo)?;
        assert!(state.pending_delete().is_some());
        let outcome = state.resolve_delete(DeleteChoice::Cancel, &repo)?;
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert!(state.is_editing());
        assert_eq!(state.list().len(), 1);
        Ok(())
    }

    #[test]
    fn failed_save_keeps_draft_and_reports() {
        let (store, repo) = memory_repo();
        store.set_offline(true);
        let mut state = AppState::new(2, 4, true);
        state.open_new();
        type_text(&mut state, "offline");

        assert_matches!(state.save(&repo), Err(EditorError::Store(_)));
        assert!(state.is_editing());
        assert!(state.editor().notice().is_some());
        assert!(state.list().is_empty());
    }

    #[test]
    fn delete_of_draft_is_suppressed() -> anyhow::Result<()> {
        let (_store, repo) = memory_repo();
        let mut state = AppState::new(2, 4, true);
        state.open_new();
        assert_eq!(state.request_delete(&repo)?, DeleteRequest::Suppressed);
        assert!(state.pending_delete().is_none());
        Ok(())
    }
}
