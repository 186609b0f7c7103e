//! NotesStore — the single in-memory notes list and its sync with a collaborator.
//!
//! Two sources change the list: explicit `load()` calls and snapshots from a
//! `subscribe()` feed. Both replace the whole list in one swap; nothing is
//! merged by id, so whichever replacement resolves last wins. Local writes
//! (`create`/`update`/`remove`) never touch the list directly. The new state
//! arrives through the feed, or through a follow-up `load()` under
//! [`RefreshPolicy::Reload`].

use crate::backend::{NotesBackend, SnapshotReceiver};
use crate::error::BackendError;
use crate::models::{BlankField, Note, NoteDraft, NoteId};
use crate::search;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded and no feed yet
    Uninitialized,
    /// A load succeeded or a feed is established
    Ready,
    /// Torn down; only the cancellation handle is still meaningful
    Closed,
}

/// How the list catches up after a successful local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Wait for the subscription feed to deliver the next snapshot
    #[default]
    Feed,
    /// Run `load()` after every successful write
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Blank(BlankField),
    /// The note has no id, so it was never persisted
    MissingId,
    Closed,
}

/// What happened to a store operation. Collaborator failures are reported
/// here rather than as errors: the list is left as it was and the caller
/// carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// No request was sent
    Skipped(SkipReason),
    /// The collaborator failed; the list keeps its last good state
    Dropped(BackendError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Read model for the presentation layer.
#[derive(Debug, Clone)]
pub struct NotesView {
    pub notes: Arc<Vec<Note>>,
    pub loading: bool,
}

struct StoreState {
    notes: Arc<Vec<Note>>,
    phase: Phase,
}

struct Shared {
    state: RwLock<StoreState>,
    /// Parent of every subscription token; cancelled on close
    root: CancellationToken,
    loads_in_flight: AtomicUsize,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Swap in a whole new list. Refused once closed.
    fn replace_list(&self, notes: Vec<Note>) -> bool {
        {
            let mut state = self.state.write();
            if state.phase == Phase::Closed {
                return false;
            }
            state.notes = Arc::new(notes);
            state.phase = Phase::Ready;
        }
        self.bump();
        true
    }

    fn mark_ready(&self) {
        let mut state = self.state.write();
        if state.phase == Phase::Uninitialized {
            state.phase = Phase::Ready;
        }
    }

    /// Returns true only for the call that actually closed the store.
    fn close(&self) -> bool {
        let first = {
            let mut state = self.state.write();
            let first = state.phase != Phase::Closed;
            state.phase = Phase::Closed;
            // Under the write lock: no snapshot can be applied after this returns
            self.root.cancel();
            first
        };
        if first {
            self.bump();
        }
        first
    }
}

/// Keeps the loading flag raised while a fetch is in flight, including when
/// the `load()` future is dropped early.
struct LoadingGuard<'a> {
    shared: &'a Shared,
}

impl<'a> LoadingGuard<'a> {
    fn start(shared: &'a Shared) -> Self {
        shared.loads_in_flight.fetch_add(1, Ordering::SeqCst);
        shared.bump();
        Self { shared }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.shared.loads_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared.bump();
    }
}

/// Handle returned by [`NotesStore::subscribe`]. Cancelling it ends the feed
/// and closes the store.
#[derive(Clone)]
pub struct SubscriptionHandle {
    token: CancellationToken,
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    /// Stop the feed and close the store. Safe to call before the first
    /// snapshot and safe to repeat; only the first effective call returns true.
    pub fn cancel(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let closed_now = self.shared.close();
        self.token.cancel();
        if closed_now {
            log::info!("[FEED] Subscription cancelled, store closed");
        }
        closed_now
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct NotesStore {
    backend: Arc<dyn NotesBackend>,
    refresh: RefreshPolicy,
    shared: Arc<Shared>,
}

impl NotesStore {
    pub fn new(backend: Arc<dyn NotesBackend>, refresh: RefreshPolicy) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            backend,
            refresh,
            shared: Arc::new(Shared {
                state: RwLock::new(StoreState {
                    notes: Arc::new(Vec::new()),
                    phase: Phase::Uninitialized,
                }),
                root: CancellationToken::new(),
                loads_in_flight: AtomicUsize::new(0),
                revision,
            }),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh
    }

    /// The current list. Always a whole list, never a partial update.
    pub fn notes(&self) -> Arc<Vec<Note>> {
        self.shared.state.read().notes.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.read().phase
    }

    pub fn view(&self) -> NotesView {
        NotesView {
            notes: self.notes(),
            loading: self.is_loading(),
        }
    }

    /// Bumped whenever the list, the loading flag or the phase changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// The Visible set for `query` over the current list.
    pub fn search(&self, query: &str) -> Vec<Note> {
        search::visible_set(&self.notes(), query)
    }

    /// Replace the list with the collaborator's full collection.
    pub async fn load(&self) -> Outcome {
        if self.phase() == Phase::Closed {
            return Outcome::Skipped(SkipReason::Closed);
        }

        let result = {
            let _loading = LoadingGuard::start(&self.shared);
            self.backend.fetch_all().await
        };

        match result {
            Ok(notes) => {
                let count = notes.len();
                if self.shared.replace_list(notes) {
                    log::debug!("[NOTES] Loaded {} notes", count);
                    Outcome::Completed
                } else {
                    log::debug!("[NOTES] Discarding load that resolved after close");
                    Outcome::Skipped(SkipReason::Closed)
                }
            }
            Err(e) => {
                log::warn!("[NOTES] Load failed, keeping current list: {}", e);
                Outcome::Dropped(e)
            }
        }
    }

    /// Start the standing snapshot feed. The returned handle must be
    /// cancelled on teardown. If the feed cannot be established the failure
    /// is logged and the handle still works for teardown.
    pub async fn subscribe(&self) -> SubscriptionHandle {
        let token = self.shared.root.child_token();
        let handle = SubscriptionHandle {
            token: token.clone(),
            shared: self.shared.clone(),
        };

        if self.phase() == Phase::Closed {
            log::warn!("[FEED] Subscribe on a closed store ignored");
            return handle;
        }

        match self.backend.watch_all(token.clone()).await {
            Ok(rx) => {
                self.shared.mark_ready();
                tokio::spawn(pump_snapshots(self.shared.clone(), rx, token));
                log::info!("[FEED] Subscribed to note snapshots");
            }
            Err(e) => log::warn!("[FEED] Subscription failed: {}", e),
        }

        handle
    }

    pub async fn create(&self, title: &str, content: &str) -> Outcome {
        let draft = match self.prepare(title, content) {
            Ok(draft) => draft,
            Err(reason) => return self.skipped("create", reason),
        };

        match self.backend.insert(&draft).await {
            Ok(id) => {
                log::info!("[NOTES] Created note {}", id);
                self.after_write().await
            }
            Err(e) => self.dropped("create", e),
        }
    }

    /// Full replace of an existing note's title and content.
    pub async fn update(&self, id: &NoteId, title: &str, content: &str) -> Outcome {
        if id.is_blank() {
            return self.skipped("update", SkipReason::MissingId);
        }
        let draft = match self.prepare(title, content) {
            Ok(draft) => draft,
            Err(reason) => return self.skipped("update", reason),
        };

        match self.backend.replace(id, &draft).await {
            Ok(()) => {
                log::info!("[NOTES] Updated note {}", id);
                self.after_write().await
            }
            Err(e) => self.dropped("update", e),
        }
    }

    pub async fn remove(&self, id: &NoteId) -> Outcome {
        if id.is_blank() {
            return self.skipped("remove", SkipReason::MissingId);
        }
        if self.phase() == Phase::Closed {
            return self.skipped("remove", SkipReason::Closed);
        }

        match self.backend.delete(id).await {
            Ok(()) => {
                log::info!("[NOTES] Removed note {}", id);
                self.after_write().await
            }
            Err(e) => self.dropped("remove", e),
        }
    }

    /// Close a store that was never subscribed (or close it early).
    /// Returns false if it was already closed.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    fn prepare(&self, title: &str, content: &str) -> Result<NoteDraft, SkipReason> {
        if self.phase() == Phase::Closed {
            return Err(SkipReason::Closed);
        }
        NoteDraft::new(title, content).map_err(SkipReason::Blank)
    }

    async fn after_write(&self) -> Outcome {
        if self.refresh == RefreshPolicy::Reload {
            // The write itself succeeded; a failed refresh is logged by load()
            let _ = self.load().await;
        }
        Outcome::Completed
    }

    fn skipped(&self, op: &str, reason: SkipReason) -> Outcome {
        log::debug!("[NOTES] {} skipped: {:?}", op, reason);
        Outcome::Skipped(reason)
    }

    fn dropped(&self, op: &str, e: BackendError) -> Outcome {
        log::warn!("[NOTES] {} failed, keeping current list: {}", op, e);
        Outcome::Dropped(e)
    }
}

async fn pump_snapshots(shared: Arc<Shared>, mut rx: SnapshotReceiver, token: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(notes) => {
                    let count = notes.len();
                    if !shared.replace_list(notes) {
                        break;
                    }
                    log::debug!("[FEED] Applied snapshot of {} notes", count);
                }
                None => {
                    log::warn!("[FEED] Snapshot feed ended");
                    break;
                }
            },
        }
    }
}
