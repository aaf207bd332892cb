use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub mod editor;
pub mod list;
pub mod markup;
pub mod repository;

pub use editor::{DeleteChoice, DeleteOutcome, DeletePrompt, DeleteRequest, EditorError, NoteEditor};
pub use list::NoteList;
pub use markup::render_content;
pub use repository::{NoteRepository, Subscription};

/// Identity of a note. `New` marks a draft the store has never seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NoteId {
    #[default]
    New,
    Existing(String),
}

impl NoteId {
    pub fn existing(&self) -> Option<&str> {
        match self {
            NoteId::New => None,
            NoteId::Existing(id) => Some(id),
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, NoteId::New)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::New => f.write_str("new"),
            NoteId::Existing(id) => f.write_str(id),
        }
    }
}

/// A store-assigned commit time, or `Unresolved` while the store has not
/// stamped the write yet. `Unresolved` orders below every resolved instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Timestamp {
    #[default]
    Unresolved,
    Resolved(OffsetDateTime),
}

impl Timestamp {
    pub fn resolved(&self) -> Option<OffsetDateTime> {
        match self {
            Timestamp::Unresolved => None,
            Timestamp::Resolved(at) => Some(*at),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Timestamp::Unresolved => "pending".to_string(),
            Timestamp::Resolved(at) => at
                .format(&Rfc3339)
                .unwrap_or_else(|_| at.unix_timestamp().to_string()),
        }
    }
}

impl From<Option<OffsetDateTime>> for Timestamp {
    fn from(value: Option<OffsetDateTime>) -> Self {
        value.map(Timestamp::Resolved).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Note {
    pub fn draft() -> Self {
        Self::default()
    }

    pub fn is_draft(&self) -> bool {
        self.id.is_new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn unresolved_sorts_below_any_resolved_instant() {
        let epoch = Timestamp::Resolved(OffsetDateTime::UNIX_EPOCH);
        assert!(Timestamp::Unresolved < epoch);
        assert!(epoch < Timestamp::Resolved(datetime!(2024-01-01 0:00 UTC)));
    }

    #[test]
    fn draft_has_no_identity() {
        let draft = Note::draft();
        assert!(draft.is_draft());
        assert_eq!(draft.id.existing(), None);
        assert_eq!(NoteId::Existing("abc".into()).existing(), Some("abc"));
    }
}
