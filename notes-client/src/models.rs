//! Note types shared by the store, the collaborators and the console.

use notes_service_types::{NoteDoc, NoteInput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters of content shown in a list preview
pub const PREVIEW_CHARS: usize = 50;

/// Opaque identifier assigned by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id stands for "not persisted yet".
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// `None` until the collaborator has stored the note
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    pub title: String,
    /// Plain text or rich-text markup
    pub content: String,
}

impl Note {
    /// An unpersisted note.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn with_id(
        id: impl Into<NoteId>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.as_ref().is_some_and(|id| !id.is_blank())
    }

    /// Case-insensitive substring match on title or content.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }

    /// Content cut to [`PREVIEW_CHARS`] characters, with `...` when truncated.
    pub fn preview(&self) -> String {
        match self.content.char_indices().nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &self.content[..cut]),
            None => self.content.clone(),
        }
    }
}

impl From<NoteDoc> for Note {
    fn from(doc: NoteDoc) -> Self {
        Self {
            id: Some(NoteId(doc.id)),
            title: doc.title,
            content: doc.content,
        }
    }
}

/// Which required field was blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankField {
    Title,
    Content,
}

impl fmt::Display for BlankField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlankField::Title => f.write_str("title"),
            BlankField::Content => f.write_str("content"),
        }
    }
}

/// A title/content pair that passed client-side validation.
/// Values are kept as typed; only the emptiness check trims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    pub fn new(title: &str, content: &str) -> Result<Self, BlankField> {
        if title.trim().is_empty() {
            return Err(BlankField::Title);
        }
        if content.trim().is_empty() {
            return Err(BlankField::Content);
        }
        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_note(self, id: NoteId) -> Note {
        Note::with_id(id, self.title, self.content)
    }
}

impl From<&NoteDraft> for NoteInput {
    fn from(draft: &NoteDraft) -> Self {
        NoteInput::new(draft.title.clone(), draft.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_requires_both_fields() {
        assert_eq!(NoteDraft::new("", "x"), Err(BlankField::Title));
        assert_eq!(NoteDraft::new("  ", "x"), Err(BlankField::Title));
        assert_eq!(NoteDraft::new("x", ""), Err(BlankField::Content));
        assert_eq!(NoteDraft::new("x", " \n"), Err(BlankField::Content));

        let draft = NoteDraft::new(" Work ", "finish report").unwrap();
        assert_eq!(draft.title(), " Work ");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let short = Note::new("t", "milk, eggs");
        assert_eq!(short.preview(), "milk, eggs");

        let exact = Note::new("t", "a".repeat(PREVIEW_CHARS));
        assert_eq!(exact.preview(), "a".repeat(PREVIEW_CHARS));

        let long = Note::new("t", "é".repeat(PREVIEW_CHARS + 5));
        assert_eq!(long.preview(), format!("{}...", "é".repeat(PREVIEW_CHARS)));
    }

    #[test]
    fn test_persisted_requires_non_blank_id() {
        assert!(!Note::new("a", "b").is_persisted());
        assert!(!Note::with_id("", "a", "b").is_persisted());
        assert!(Note::with_id("1", "a", "b").is_persisted());
    }

    #[test]
    fn test_note_from_doc() {
        let note = Note::from(NoteDoc {
            id: "42".to_string(),
            title: "Work".to_string(),
            content: "finish report".to_string(),
            created_at: None,
            updated_at: None,
        });
        assert_eq!(note, Note::with_id("42", "Work", "finish report"));
    }
}
