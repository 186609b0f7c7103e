//! Visible set: the search-filtered projection of the notes list.

use crate::models::Note;

/// Notes whose title or content contains `query`, ignoring case, in list order.
/// An empty query matches everything.
pub fn visible_set(notes: &[Note], query: &str) -> Vec<Note> {
    if query.is_empty() {
        return notes.to_vec();
    }

    let needle = query.to_lowercase();
    notes
        .iter()
        .filter(|note| note.matches_lowercase(&needle))
        .cloned()
        .collect()
}
