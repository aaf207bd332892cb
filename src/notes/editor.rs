use thiserror::Error;

use super::{Note, NoteId, NoteList, NoteRepository};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no note is open in the editor")]
    NotOpen,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pending confirmation for deleting the open note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrompt {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteRequest {
    /// Nothing to delete remotely: the editor is closed or holds a draft.
    Suppressed,
    Prompt(DeletePrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteChoice {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { id: String },
    Cancelled,
    NothingPending,
}

/// Owns the single working copy being edited and routes its writes.
///
/// The working copy is separate from the list: nothing in [`NoteList`]
/// changes until the store acknowledges a save or delete. A failed write
/// keeps the editor open with the draft intact and sets a notice for the
/// user.
#[derive(Debug, Default)]
pub struct NoteEditor {
    draft: Option<Note>,
    pending_delete: Option<DeletePrompt>,
    notice: Option<String>,
}

impl NoteEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_new(&mut self) {
        self.open(Note::draft());
    }

    pub fn open_existing(&mut self, note: &Note) {
        self.open(note.clone());
    }

    fn open(&mut self, note: Note) {
        tracing::debug!(note_id = %note.id, "editor opened");
        self.draft = Some(note);
        self.pending_delete = None;
        self.notice = None;
    }

    /// Discards the working copy without writing.
    pub fn close(&mut self) {
        self.draft = None;
        self.pending_delete = None;
        self.notice = None;
    }

    pub fn is_open(&self) -> bool {
        self.draft.is_some()
    }

    pub fn draft(&self) -> Option<&Note> {
        self.draft.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn pending_delete(&self) -> Option<&DeletePrompt> {
        self.pending_delete.as_ref()
    }

    /// Delete is only offered for notes the store already knows.
    pub fn can_delete(&self) -> bool {
        matches!(
            self.draft.as_ref().map(|note| &note.id),
            Some(NoteId::Existing(_))
        )
    }

    pub fn set_title(&mut self, text: impl Into<String>) {
        if let Some(draft) = self.draft.as_mut() {
            draft.title = text.into();
        }
    }

    pub fn set_content(&mut self, text: impl Into<String>) {
        if let Some(draft) = self.draft.as_mut() {
            draft.content = text.into();
        }
    }

    /// Creates the draft if it has no id yet, otherwise updates it. On
    /// success the committed note replaces the list entry and the editor
    /// closes.
    pub fn save(
        &mut self,
        repo: &NoteRepository,
        list: &mut NoteList,
    ) -> Result<Note, EditorError> {
        let draft = self.draft.as_ref().ok_or(EditorError::NotOpen)?;
        let result = match &draft.id {
            NoteId::New => repo.create(&draft.title, &draft.content),
            NoteId::Existing(id) => repo.update(id, &draft.title, &draft.content),
        };
        match result {
            Ok(committed) => {
                list.commit(committed.clone());
                self.close();
                Ok(committed)
            }
            Err(err) => {
                tracing::error!(?err, note_id = %draft.id, "saving note failed");
                self.notice = Some(save_notice(&err));
                Err(err.into())
            }
        }
    }

    pub fn request_delete(&mut self) -> DeleteRequest {
        let prompt = match self.draft.as_ref() {
            Some(Note {
                id: NoteId::Existing(id),
                title,
                ..
            }) => DeletePrompt {
                id: id.clone(),
                title: title.clone(),
            },
            _ => return DeleteRequest::Suppressed,
        };
        self.pending_delete = Some(prompt.clone());
        DeleteRequest::Prompt(prompt)
    }

    pub fn resolve_delete(
        &mut self,
        choice: DeleteChoice,
        repo: &NoteRepository,
        list: &mut NoteList,
    ) -> Result<DeleteOutcome, EditorError> {
        let Some(prompt) = self.pending_delete.take() else {
            return Ok(DeleteOutcome::NothingPending);
        };
        if choice == DeleteChoice::Cancel {
            return Ok(DeleteOutcome::Cancelled);
        }
        match repo.delete(&prompt.id) {
            Ok(()) => {
                list.remove(&prompt.id);
                self.close();
                Ok(DeleteOutcome::Deleted { id: prompt.id })
            }
            Err(err) => {
                tracing::error!(?err, note_id = %prompt.id, "deleting note failed");
                self.notice = Some(format!("Could not delete note: {err}"));
                Err(err.into())
            }
        }
    }
}

fn save_notice(err: &StoreError) -> String {
    match err {
        StoreError::NotFound { .. } => {
            "This note was deleted elsewhere; your text is still here.".to_string()
        }
        other => format!("Could not save note: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::repository::DEFAULT_COLLECTION;
    use crate::notes::Timestamp;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryStore>, NoteRepository, NoteList) {
        let store = Arc::new(MemoryStore::new());
        let repo = NoteRepository::new(store.clone(), DEFAULT_COLLECTION);
        (store, repo, NoteList::new())
    }

    fn saved_note(repo: &NoteRepository, list: &mut NoteList, title: &str) -> Note {
        let mut editor = NoteEditor::new();
        editor.open_new();
        editor.set_title(title);
        editor.save(repo, list).expect("save succeeds")
    }

    #[test]
    fn saving_new_draft_creates_exactly_one_note_in_next_snapshot() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let (_sub, rx) = repo.subscribe_channel()?;
        list.apply_snapshot(rx.recv_timeout(Duration::from_secs(5))?);

        let mut editor = NoteEditor::new();
        editor.open_new();
        editor.set_title("T");
        editor.set_content("C");
        let saved = editor.save(&repo, &mut list)?;
        assert!(!editor.is_open());

        list.apply_snapshot(rx.recv_timeout(Duration::from_secs(5))?);
        let view = list.sorted_view();
        assert_eq!(view.len(), 1);
        assert_eq!((view[0].title.as_str(), view[0].content.as_str()), ("T", "C"));
        assert_eq!(view[0].id, saved.id);
        assert!(!view[0].id.to_string().is_empty());
        Ok(())
    }

    #[test]
    fn saved_draft_is_committed_to_list_before_any_push() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let saved = saved_note(&repo, &mut list, "optimistic");
        let id = saved.id.existing().expect("id");
        assert_eq!(list.get(id).map(|n| n.updated_at), Some(Timestamp::Unresolved));
        Ok(())
    }

    #[test]
    fn saving_existing_note_keeps_id_and_never_moves_timestamp_back() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "first");
        let id = created.id.existing().expect("id").to_owned();
        let before = repo.update(&id, "first", "")?;
        list.commit(before.clone());

        let mut editor = NoteEditor::new();
        editor.open_existing(&before);
        editor.set_content("more text");
        let after = editor.save(&repo, &mut list)?;

        assert_eq!(after.id, before.id);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(list.get(&id).map(|n| n.content.as_str()), Some("more text"));
        Ok(())
    }

    #[test]
    fn empty_title_and_content_are_saved_as_is() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let mut editor = NoteEditor::new();
        editor.open_new();
        let saved = editor.save(&repo, &mut list)?;
        assert_eq!(saved.title, "");
        assert_eq!(saved.content, "");
        assert_eq!(repo.fetch_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn failed_save_keeps_draft_open_with_notice() {
        let (store, repo, mut list) = setup();
        store.set_offline(true);
        let mut editor = NoteEditor::new();
        editor.open_new();
        editor.set_title("unsaved");

        assert_matches!(
            editor.save(&repo, &mut list),
            Err(EditorError::Store(StoreError::Write { .. }))
        );
        assert!(editor.is_open());
        assert_eq!(editor.draft().map(|d| d.title.as_str()), Some("unsaved"));
        assert!(editor.notice().is_some());
        assert!(list.is_empty());

        store.set_offline(false);
        assert!(editor.save(&repo, &mut list).is_ok());
        assert!(editor.notice().is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn saving_note_deleted_elsewhere_keeps_draft() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "doomed");
        let mut editor = NoteEditor::new();
        editor.open_existing(&created);
        repo.delete(created.id.existing().expect("id"))?;

        editor.set_content("rescued");
        assert_matches!(
            editor.save(&repo, &mut list),
            Err(EditorError::Store(StoreError::NotFound { .. }))
        );
        assert_eq!(editor.draft().map(|d| d.content.as_str()), Some("rescued"));
        assert!(repo.fetch_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn save_without_open_note_is_an_error() {
        let (_store, repo, mut list) = setup();
        let mut editor = NoteEditor::new();
        assert_matches!(editor.save(&repo, &mut list), Err(EditorError::NotOpen));
    }

    #[test]
    fn delete_on_new_draft_is_suppressed_without_store_call() -> anyhow::Result<()> {
        let (store, repo, mut list) = setup();
        // Any store call while offline would fail, so success proves none was made.
        store.set_offline(true);
        let mut editor = NoteEditor::new();
        editor.open_new();
        assert!(!editor.can_delete());
        assert_eq!(editor.request_delete(), DeleteRequest::Suppressed);
        assert_eq!(
            editor.resolve_delete(DeleteChoice::Confirm, &repo, &mut list)?,
            DeleteOutcome::NothingPending
        );
        assert!(editor.is_open());
        assert!(editor.notice().is_none());
        Ok(())
    }

    #[test]
    fn cancelled_delete_leaves_everything_in_place() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "keep");
        let mut editor = NoteEditor::new();
        editor.open_existing(&created);

        assert_matches!(editor.request_delete(), DeleteRequest::Prompt(ref p) if p.title == "keep");
        assert_eq!(
            editor.resolve_delete(DeleteChoice::Cancel, &repo, &mut list)?,
            DeleteOutcome::Cancelled
        );
        assert!(editor.is_open());
        assert!(editor.pending_delete().is_none());
        assert_eq!(repo.fetch_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn confirmed_delete_removes_note_after_next_snapshot() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "bye");
        let id = created.id.existing().expect("id").to_owned();
        let (_sub, rx) = repo.subscribe_channel()?;
        list.apply_snapshot(rx.recv_timeout(Duration::from_secs(5))?);
        assert!(list.get(&id).is_some());

        let mut editor = NoteEditor::new();
        editor.open_existing(&created);
        editor.request_delete();
        let outcome = editor.resolve_delete(DeleteChoice::Confirm, &repo, &mut list)?;
        assert_eq!(outcome, DeleteOutcome::Deleted { id: id.clone() });
        assert!(!editor.is_open());

        list.apply_snapshot(rx.recv_timeout(Duration::from_secs(5))?);
        assert!(list.sorted_view().iter().all(|note| note.id != created.id));
        Ok(())
    }

    #[test]
    fn deleting_already_absent_note_succeeds() -> anyhow::Result<()> {
        let (_store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "twice");
        repo.delete(created.id.existing().expect("id"))?;

        let mut editor = NoteEditor::new();
        editor.open_existing(&created);
        editor.request_delete();
        assert_matches!(
            editor.resolve_delete(DeleteChoice::Confirm, &repo, &mut list)?,
            DeleteOutcome::Deleted { .. }
        );
        Ok(())
    }

    #[test]
    fn failed_delete_keeps_editor_open() {
        let (store, repo, mut list) = setup();
        let created = saved_note(&repo, &mut list, "sticky");
        store.set_offline(true);

        let mut editor = NoteEditor::new();
        editor.open_existing(&created);
        editor.request_delete();
        assert!(editor
            .resolve_delete(DeleteChoice::Confirm, &repo, &mut list)
            .is_err());
        assert!(editor.is_open());
        assert!(editor.notice().is_some());
        assert_eq!(list.len(), 1);
    }
}
