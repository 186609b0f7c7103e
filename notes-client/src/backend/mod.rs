//! Collaborators: the remote document stores a [`NotesStore`](crate::NotesStore) syncs with.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;
use crate::models::{Note, NoteDraft, NoteId};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Snapshots a feed may queue for a slow consumer before it is disconnected.
pub const FEED_BUFFER: usize = 100;

/// Receiving end of a snapshot feed. Each item is the full collection.
/// The channel ends if the consumer falls `FEED_BUFFER` snapshots behind.
pub type SnapshotReceiver = mpsc::Receiver<Vec<Note>>;

#[async_trait]
pub trait NotesBackend: Send + Sync {
    /// Full collection in store order.
    async fn fetch_all(&self) -> Result<Vec<Note>, BackendError>;

    /// Store a new note and return the id assigned to it.
    async fn insert(&self, draft: &NoteDraft) -> Result<NoteId, BackendError>;

    /// Replace title and content of an existing note.
    async fn replace(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), BackendError>;

    async fn delete(&self, id: &NoteId) -> Result<(), BackendError>;

    /// Open a standing feed of full snapshots. The current snapshot is
    /// delivered first, then one per change, FIFO. The feed stops once
    /// `cancel` fires.
    async fn watch_all(&self, cancel: CancellationToken) -> Result<SnapshotReceiver, BackendError>;
}
