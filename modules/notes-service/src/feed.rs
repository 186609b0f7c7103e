//! Snapshot fan-out for `/notes/watch` connections.

use dashmap::DashMap;
use notes_service_types::{FeedMessage, NoteDoc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Snapshots queued per connection before a slow watcher is dropped.
pub const CLIENT_BUFFER: usize = 100;

/// Registry of live watch connections. Each subscriber gets its own bounded
/// queue, so delivery is FIFO per connection. A subscriber whose queue fills
/// up is removed, which ends its receiver once the backlog is drained.
#[derive(Default)]
pub struct SnapshotBroadcaster {
    clients: DashMap<String, mpsc::Sender<FeedMessage>>,
}

impl SnapshotBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Returns its id and the receiving end of its queue.
    pub fn subscribe(&self) -> (String, mpsc::Receiver<FeedMessage>) {
        let client_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.insert(client_id.clone(), tx);
        log::debug!("[FEED] Subscriber {} registered", client_id);
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            log::debug!("[FEED] Subscriber {} removed", client_id);
        }
    }

    /// Push a full snapshot to every subscriber, dropping any whose
    /// connection has gone away or fallen too far behind. Returns the
    /// number of deliveries.
    pub fn publish(&self, notes: Vec<NoteDoc>) -> usize {
        let msg = FeedMessage::Snapshot { notes };
        let mut dead = Vec::new();
        let mut delivered = 0;

        for entry in self.clients.iter() {
            match entry.value().try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!("[FEED] Subscriber {} lagging, disconnecting", entry.key());
                    dead.push(entry.key().clone());
                }
                Err(TrySendError::Closed(_)) => dead.push(entry.key().clone()),
            }
        }

        for client_id in dead {
            self.unsubscribe(&client_id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.clients.len()
    }
}
