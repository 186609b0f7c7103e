use crate::models::NoteId;

/// Failures reported by a notes collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transient network or store failure
    #[error("Notes store unavailable: {0}")]
    Unavailable(String),
    /// The collaborator refused the note (blank title or content)
    #[error("Note rejected: {0}")]
    ValidationRejected(String),
    /// Replace/delete referenced an id that no longer exists
    #[error("Note not found: {0}")]
    NotFound(NoteId),
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
