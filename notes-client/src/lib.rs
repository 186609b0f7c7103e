//! Notes client — keeps an in-memory notes list in sync with a remote
//! document store and its live snapshot feed.

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod store;
pub mod theme;

pub use backend::{HttpBackend, MemoryBackend, NotesBackend};
pub use error::{BackendError, SettingsError};
pub use models::{BlankField, Note, NoteDraft, NoteId};
pub use store::{NotesStore, NotesView, Outcome, Phase, RefreshPolicy, SkipReason, SubscriptionHandle};
pub use theme::{JsonFileSettings, MemorySettings, SettingsStore, Theme, ThemeSettings};
