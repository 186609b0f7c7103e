//! In-process document store with a change feed.

use super::{FEED_BUFFER, NotesBackend, SnapshotReceiver};
use crate::error::BackendError;
use crate::models::{Note, NoteDraft, NoteId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Watchers = Arc<DashMap<u64, mpsc::Sender<Vec<Note>>>>;

/// Keeps notes in insertion order and pushes a snapshot to every watcher
/// after each committed change.
///
/// `set_available(false)` makes every call fail with `Unavailable`, and
/// `request_count` reports how many calls reached the store.
pub struct MemoryBackend {
    notes: Mutex<Vec<Note>>,
    watchers: Watchers,
    next_watcher: AtomicU64,
    available: AtomicBool,
    requests: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_notes(Vec::new())
    }

    /// Seed the store. Notes without an id get one.
    pub fn with_notes(notes: Vec<Note>) -> Self {
        let notes = notes
            .into_iter()
            .map(|mut note| {
                if !note.is_persisted() {
                    note.id = Some(new_id());
                }
                note
            })
            .collect();

        Self {
            notes: Mutex::new(notes),
            watchers: Arc::new(DashMap::new()),
            next_watcher: AtomicU64::new(1),
            available: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Calls made against the store, failed ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Current contents, without counting as a request.
    pub fn snapshot(&self) -> Vec<Note> {
        self.notes.lock().clone()
    }

    fn begin(&self, op: &str) -> Result<(), BackendError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!("{} refused: store offline", op)))
        }
    }

    /// Fan a snapshot out to watchers. Called with the notes lock held so
    /// every watcher sees commits in order. A watcher whose queue is full is
    /// disconnected rather than buffered without bound.
    fn publish(&self, notes: &[Note]) {
        let mut dead = Vec::new();
        for entry in self.watchers.iter() {
            match entry.value().try_send(notes.to_vec()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("[FEED] Watcher {} lagging, disconnecting", entry.key());
                    dead.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }
        for watcher_id in dead {
            self.watchers.remove(&watcher_id);
        }
    }
}

fn new_id() -> NoteId {
    NoteId::new(uuid::Uuid::new_v4().to_string())
}

#[async_trait]
impl NotesBackend for MemoryBackend {
    async fn fetch_all(&self) -> Result<Vec<Note>, BackendError> {
        self.begin("fetch")?;
        Ok(self.notes.lock().clone())
    }

    async fn insert(&self, draft: &NoteDraft) -> Result<NoteId, BackendError> {
        self.begin("insert")?;
        let id = new_id();
        let mut notes = self.notes.lock();
        notes.push(draft.clone().into_note(id.clone()));
        self.publish(&notes);
        Ok(id)
    }

    async fn replace(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), BackendError> {
        self.begin("replace")?;
        let mut notes = self.notes.lock();
        let slot = notes
            .iter_mut()
            .find(|note| note.id.as_ref() == Some(id))
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;
        *slot = draft.clone().into_note(id.clone());
        self.publish(&notes);
        Ok(())
    }

    async fn delete(&self, id: &NoteId) -> Result<(), BackendError> {
        self.begin("delete")?;
        let mut notes = self.notes.lock();
        let before = notes.len();
        notes.retain(|note| note.id.as_ref() != Some(id));
        if notes.len() == before {
            return Err(BackendError::NotFound(id.clone()));
        }
        self.publish(&notes);
        Ok(())
    }

    async fn watch_all(&self, cancel: CancellationToken) -> Result<SnapshotReceiver, BackendError> {
        self.begin("watch")?;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let watcher_id = self.next_watcher.fetch_add(1, Ordering::SeqCst);

        {
            // Register and send the first snapshot atomically with respect to writers
            let notes = self.notes.lock();
            let _ = tx.try_send(notes.clone());
            self.watchers.insert(watcher_id, tx);
        }

        let watchers = self.watchers.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            watchers.remove(&watcher_id);
        });

        Ok(rx)
    }
}
