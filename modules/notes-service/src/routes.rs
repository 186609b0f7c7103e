//! Axum route handlers for the notes REST API and its snapshot feed.

use crate::db::Database;
use crate::feed::SnapshotBroadcaster;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Json, Response};
use futures_util::{SinkExt, StreamExt};
use notes_service_types::*;
use std::sync::Arc;
use std::time::Instant;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
    pub db: Database,
    pub feed: SnapshotBroadcaster,
    /// Held across mutate + snapshot + publish so watchers see commits in order
    pub write_gate: tokio::sync::Mutex<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: SnapshotBroadcaster::new(),
            write_gate: tokio::sync::Mutex::new(()),
            start_time: Instant::now(),
        }
    }

    /// Push the committed collection to watchers. Caller holds `write_gate`.
    fn publish_snapshot(&self) {
        match self.db.list_notes() {
            Ok(notes) => {
                let delivered = self.feed.publish(notes);
                log::debug!("[FEED] Snapshot delivered to {} watchers", delivered);
            }
            Err(e) => log::error!("[FEED] Failed to read snapshot: {}", e),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn storage_error<T>(action: &str, e: rusqlite::Error) -> ApiResult<T> {
    log::error!("[DB] Failed to {}: {}", action, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err(format!("Failed to {}", action))),
    )
}

fn rejected<T>(input: &NoteInput) -> Option<ApiResult<T>> {
    input.blank_field().map(|field| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err(format!("{} is empty", field))),
        )
    })
}

fn not_found<T>(id: &str) -> ApiResult<T> {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::err(format!("Note not found: {}", id))),
    )
}

// GET /notes
pub async fn list_notes(State(state): State<Arc<AppState>>) -> ApiResult<Vec<NoteDoc>> {
    match state.db.list_notes() {
        Ok(notes) => (StatusCode::OK, Json(ApiResponse::ok(notes))),
        Err(e) => storage_error("list notes", e),
    }
}

// POST /notes/add
pub async fn add_note(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NoteInput>,
) -> ApiResult<NoteDoc> {
    if let Some(resp) = rejected(&input) {
        return resp;
    }

    let _gate = state.write_gate.lock().await;
    match state.db.insert_note(&input) {
        Ok(doc) => {
            log::info!("[NOTES] Note added: {}", doc.id);
            state.publish_snapshot();
            (StatusCode::OK, Json(ApiResponse::ok(doc)))
        }
        Err(e) => storage_error("add note", e),
    }
}

// PUT /notes/:id
pub async fn replace_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<NoteInput>,
) -> ApiResult<NoteDoc> {
    if let Some(resp) = rejected(&input) {
        return resp;
    }

    let _gate = state.write_gate.lock().await;
    match state.db.replace_note(&id, &input) {
        Ok(Some(doc)) => {
            log::info!("[NOTES] Note replaced: {}", id);
            state.publish_snapshot();
            (StatusCode::OK, Json(ApiResponse::ok(doc)))
        }
        Ok(None) => not_found(&id),
        Err(e) => storage_error("replace note", e),
    }
}

// DELETE /notes/:id
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let _gate = state.write_gate.lock().await;
    match state.db.delete_note(&id) {
        Ok(true) => {
            log::info!("[NOTES] Note deleted: {}", id);
            state.publish_snapshot();
            (StatusCode::OK, Json(ApiResponse::ok(id)))
        }
        Ok(false) => not_found(&id),
        Err(e) => storage_error("delete note", e),
    }
}

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<ServiceStatus> {
    let note_count = match state.db.count_notes() {
        Ok(count) => count,
        Err(e) => return storage_error("count notes", e),
    };

    let status = ServiceStatus {
        running: true,
        version: VERSION.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        note_count,
        watchers: state.feed.subscriber_count(),
    };

    (StatusCode::OK, Json(ApiResponse::ok(status)))
}

// GET /notes/watch
pub async fn watch_notes(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_watch(socket, state))
}

async fn handle_watch(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Subscribe and read the initial snapshot atomically with respect to writers,
    // so the queue only holds snapshots newer than the first frame.
    let (client_id, mut event_rx, initial) = {
        let _gate = state.write_gate.lock().await;
        let (client_id, event_rx) = state.feed.subscribe();
        (client_id, event_rx, state.db.list_notes())
    };

    let initial = match initial {
        Ok(notes) => FeedMessage::Snapshot { notes },
        Err(e) => {
            log::error!("[FEED] Failed to read initial snapshot: {}", e);
            state.feed.unsubscribe(&client_id);
            return;
        }
    };

    log::info!("[FEED] Watcher {} connected", client_id);

    if send_frame(&mut ws_sender, &initial).await {
        loop {
            tokio::select! {
                msg = event_rx.recv() => {
                    let Some(msg) = msg else {
                        log::warn!("[FEED] Watcher {} dropped from the feed", client_id);
                        break;
                    };
                    if !send_frame(&mut ws_sender, &msg).await {
                        break;
                    }
                }
                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            log::warn!("[FEED] Watcher {} socket error: {}", client_id, e);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    state.feed.unsubscribe(&client_id);
    log::info!("[FEED] Watcher {} disconnected", client_id);
}

async fn send_frame<S>(ws_sender: &mut S, msg: &FeedMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            log::error!("[FEED] Failed to encode snapshot: {}", e);
            return false;
        }
    };
    ws_sender.send(Message::Text(json)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_add_rejects_blank_fields() {
        let state = state();

        let (status, Json(resp)) =
            add_note(State(state.clone()), Json(NoteInput::new("", "x"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp.error.unwrap().contains("title"));

        let (status, _) = add_note(State(state.clone()), Json(NoteInput::new("x", "  "))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(state.db.count_notes().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mutations_publish_snapshots() {
        let state = state();
        let (_id, mut rx) = state.feed.subscribe();

        let (status, Json(resp)) = add_note(
            State(state.clone()),
            Json(NoteInput::new("Groceries", "milk, eggs")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let doc = resp.data.unwrap();

        let FeedMessage::Snapshot { notes } = rx.recv().await.unwrap();
        assert_eq!(notes, vec![doc.clone()]);

        let (status, _) = replace_note(
            State(state.clone()),
            Path(doc.id.clone()),
            Json(NoteInput::new("Groceries", "milk, eggs, bread")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let FeedMessage::Snapshot { notes } = rx.recv().await.unwrap();
        assert_eq!(notes[0].content, "milk, eggs, bread");

        let (status, Json(resp)) = delete_note(State(state.clone()), Path(doc.id.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap(), doc.id);
        let FeedMessage::Snapshot { notes } = rx.recv().await.unwrap();
        assert!(notes.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let state = state();
        let (_id, mut rx) = state.feed.subscribe();

        let (status, _) = replace_note(
            State(state.clone()),
            Path("missing".to_string()),
            Json(NoteInput::new("a", "b")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = delete_note(State(state.clone()), Path("missing".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Failed mutations publish nothing
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_list_and_health() {
        let state = state();
        let (status, _) =
            add_note(State(state.clone()), Json(NoteInput::new("Work", "finish report"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, Json(resp)) = list_notes(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap()[0].title, "Work");

        let (_id, _rx) = state.feed.subscribe();
        let (_, Json(resp)) = health(State(state.clone())).await;
        let status = resp.data.unwrap();
        assert_eq!(status.note_count, 1);
        assert_eq!(status.watchers, 1);
        assert_eq!(status.version, VERSION);
    }
}
