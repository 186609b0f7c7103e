//! Typed HTTP client for the notes service, plus its WebSocket snapshot feed.

use super::{FEED_BUFFER, NotesBackend, SnapshotReceiver};
use crate::error::BackendError;
use crate::models::{Note, NoteDraft, NoteId};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use notes_service_types::{ApiResponse, FeedMessage, NoteDoc, NoteInput};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

pub struct HttpBackend {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    /// `base_url` must be an absolute `http(s)://` URL; a path prefix is kept.
    pub fn new(base_url: &str) -> Result<Self, String> {
        let parsed = Url::parse(base_url)
            .map_err(|e| format!("Invalid notes service URL {:?}: {}", base_url, e))?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("Notes service URL must be http(s): {}", base_url));
        }

        Ok(Self {
            base_url: parsed,
            client: reqwest::Client::new(),
        })
    }

    /// Base URL with `segments` appended. Each segment is percent-encoded,
    /// so an id can never spill into the query, fragment or another path.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn note_url(&self, id: &NoteId) -> Url {
        self.url(&["notes", id.as_str()])
    }

    /// `http://host` → `ws://host/notes/watch`, `https` → `wss`
    fn watch_url(&self) -> String {
        let mut url = self.url(&["notes", "watch"]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        if url.set_scheme(scheme).is_err() {
            log::warn!("[FEED] Could not switch {} to {}", url, scheme);
        }
        url.to_string()
    }
}

fn unreachable_service(e: reqwest::Error) -> BackendError {
    BackendError::Unavailable(format!("Notes service unreachable: {}", e))
}

/// Decode an `ApiResponse` envelope, mapping HTTP status to the error taxonomy:
/// 404 → `NotFound` (when an id is involved), 400 → `ValidationRejected`,
/// anything else → `Unavailable`.
async fn decode<T: DeserializeOwned>(
    resp: Response,
    id: Option<&NoteId>,
) -> Result<T, BackendError> {
    let status = resp.status();
    let body = resp.json::<ApiResponse<T>>().await;

    if status.is_success() {
        let body = body.map_err(|e| {
            BackendError::Unavailable(format!("Invalid response from notes service: {}", e))
        })?;
        return body.data.ok_or_else(|| {
            BackendError::Unavailable(
                body.error
                    .unwrap_or_else(|| "Empty response from notes service".to_string()),
            )
        });
    }

    let message = body
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("HTTP {}", status));

    Err(match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => BackendError::NotFound(id.clone()),
        (StatusCode::BAD_REQUEST, _) => BackendError::ValidationRejected(message),
        _ => BackendError::Unavailable(message),
    })
}

#[async_trait]
impl NotesBackend for HttpBackend {
    async fn fetch_all(&self) -> Result<Vec<Note>, BackendError> {
        let resp = self
            .client
            .get(self.url(&["notes"]))
            .send()
            .await
            .map_err(unreachable_service)?;

        let docs: Vec<NoteDoc> = decode(resp, None).await?;
        Ok(docs.into_iter().map(Note::from).collect())
    }

    async fn insert(&self, draft: &NoteDraft) -> Result<NoteId, BackendError> {
        let resp = self
            .client
            .post(self.url(&["notes", "add"]))
            .json(&NoteInput::from(draft))
            .send()
            .await
            .map_err(unreachable_service)?;

        let doc: NoteDoc = decode(resp, None).await?;
        Ok(NoteId::new(doc.id))
    }

    async fn replace(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), BackendError> {
        let resp = self
            .client
            .put(self.note_url(id))
            .json(&NoteInput::from(draft))
            .send()
            .await
            .map_err(unreachable_service)?;

        let _: NoteDoc = decode(resp, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, id: &NoteId) -> Result<(), BackendError> {
        let resp = self
            .client
            .delete(self.note_url(id))
            .send()
            .await
            .map_err(unreachable_service)?;

        let _: String = decode(resp, Some(id)).await?;
        Ok(())
    }

    async fn watch_all(&self, cancel: CancellationToken) -> Result<SnapshotReceiver, BackendError> {
        let url = self.watch_url();
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| BackendError::Unavailable(format!("Feed connection failed: {}", e)))?;

        log::info!("[FEED] Connected to {}", url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, rx) = mpsc::channel(FEED_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                    incoming = ws_receiver.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<FeedMessage>(&text) {
                                    Ok(FeedMessage::Snapshot { notes }) => {
                                        let notes = notes.into_iter().map(Note::from).collect();
                                        match tx.try_send(notes) {
                                            Ok(()) => {}
                                            Err(TrySendError::Full(_)) => {
                                                log::warn!("[FEED] Snapshot consumer lagging, dropping feed");
                                                let _ = ws_sender.send(Message::Close(None)).await;
                                                break;
                                            }
                                            Err(TrySendError::Closed(_)) => break,
                                        }
                                    }
                                    Err(e) => log::warn!("[FEED] Ignoring malformed frame: {}", e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                log::warn!("[FEED] Notes service closed the feed");
                                break;
                            }
                            Some(Err(e)) => {
                                log::error!("[FEED] WebSocket error: {}", e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NotesStore, Outcome, RefreshPolicy};
    use axum::extract::ws::{Message as WsMessage, WebSocketUpgrade};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::{Json, Response};
    use axum::routing::{get, post, put};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Fixed-answer stand-in for the notes service. Only the note `known`
    /// exists; every id that reaches `PUT`/`DELETE` is recorded as decoded.
    #[derive(Default)]
    struct Stub {
        seen_ids: parking_lot::Mutex<Vec<String>>,
        offline: AtomicBool,
    }

    type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

    fn doc(id: &str, title: &str, content: &str) -> NoteDoc {
        NoteDoc {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    async fn stub_list(State(stub): State<Arc<Stub>>) -> Reply<Vec<NoteDoc>> {
        if stub.offline.load(Ordering::SeqCst) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("Failed to list notes")),
            );
        }
        (
            StatusCode::OK,
            Json(ApiResponse::ok(vec![doc("known", "Groceries", "milk")])),
        )
    }

    async fn stub_add(Json(_input): Json<NoteInput>) -> Reply<NoteDoc> {
        (StatusCode::BAD_REQUEST, Json(ApiResponse::err("title is empty")))
    }

    async fn stub_replace(
        State(stub): State<Arc<Stub>>,
        Path(id): Path<String>,
        Json(input): Json<NoteInput>,
    ) -> Reply<NoteDoc> {
        stub.seen_ids.lock().push(id.clone());
        if id == "known" {
            (
                StatusCode::OK,
                Json(ApiResponse::ok(doc(&id, &input.title, &input.content))),
            )
        } else {
            (StatusCode::NOT_FOUND, Json(ApiResponse::err("Note not found")))
        }
    }

    async fn stub_delete(State(stub): State<Arc<Stub>>, Path(id): Path<String>) -> Reply<String> {
        stub.seen_ids.lock().push(id.clone());
        if id == "known" {
            (StatusCode::OK, Json(ApiResponse::ok(id)))
        } else {
            (StatusCode::NOT_FOUND, Json(ApiResponse::err("Note not found")))
        }
    }

    async fn stub_watch(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|mut socket| async move {
            let snapshot = FeedMessage::Snapshot {
                notes: vec![
                    doc("a", "Groceries", "milk, eggs"),
                    doc("b", "Work", "finish report"),
                ],
            };
            let frames = [
                "{not a frame".to_string(),
                serde_json::to_string(&snapshot).unwrap(),
            ];
            for frame in frames {
                if socket.send(WsMessage::Text(frame)).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(msg)) = socket.recv().await {
                if matches!(msg, WsMessage::Close(_)) {
                    break;
                }
            }
        })
    }

    async fn serve_stub() -> (Arc<Stub>, String) {
        let stub = Arc::new(Stub::default());
        let app = axum::Router::new()
            .route("/notes", get(stub_list))
            .route("/notes/add", post(stub_add))
            .route("/notes/watch", get(stub_watch))
            .route("/notes/:id", put(stub_replace).delete(stub_delete))
            .with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        (stub, format!("http://{}", addr))
    }

    #[test]
    fn test_watch_url_scheme() {
        assert_eq!(
            HttpBackend::new("http://127.0.0.1:9110/").unwrap().watch_url(),
            "ws://127.0.0.1:9110/notes/watch"
        );
        assert_eq!(
            HttpBackend::new("https://notes.example.com/api").unwrap().watch_url(),
            "wss://notes.example.com/api/notes/watch"
        );
        assert!(HttpBackend::new("not a url").is_err());
        assert!(HttpBackend::new("ftp://notes.example.com").is_err());
    }

    #[test]
    fn test_note_url_escapes_reserved_characters() {
        let backend = HttpBackend::new("http://127.0.0.1:9110").unwrap();
        assert_eq!(
            backend.note_url(&NoteId::new("abc")).as_str(),
            "http://127.0.0.1:9110/notes/abc"
        );
        assert_eq!(
            backend.note_url(&NoteId::new("abc?typo")).as_str(),
            "http://127.0.0.1:9110/notes/abc%3Ftypo"
        );
        assert_eq!(
            backend.note_url(&NoteId::new("a#b/c")).as_str(),
            "http://127.0.0.1:9110/notes/a%23b%2Fc"
        );
    }

    #[tokio::test]
    async fn test_status_codes_map_to_backend_errors() {
        let (stub, base) = serve_stub().await;
        let backend = HttpBackend::new(&base).unwrap();

        let notes = backend.fetch_all().await.unwrap();
        assert_eq!(notes, vec![Note::with_id("known", "Groceries", "milk")]);

        let draft = NoteDraft::new("Groceries", "milk").unwrap();
        assert_eq!(
            backend.insert(&draft).await,
            Err(BackendError::ValidationRejected("title is empty".to_string()))
        );

        let missing = NoteId::new("missing");
        assert_eq!(
            backend.replace(&missing, &draft).await,
            Err(BackendError::NotFound(missing.clone()))
        );
        assert_eq!(
            backend.delete(&missing).await,
            Err(BackendError::NotFound(missing))
        );
        assert_eq!(backend.replace(&NoteId::new("known"), &draft).await, Ok(()));

        stub.offline.store(true, Ordering::SeqCst);
        assert_eq!(
            backend.fetch_all().await,
            Err(BackendError::Unavailable("Failed to list notes".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reserved_characters_never_reach_another_note() {
        let (stub, base) = serve_stub().await;
        let backend: Arc<dyn NotesBackend> = Arc::new(HttpBackend::new(&base).unwrap());
        let store = NotesStore::new(backend, RefreshPolicy::Reload);
        assert_eq!(store.load().await, Outcome::Completed);

        let ids = ["known?typo", "known#frag", "known/extra"];
        for raw in ids {
            let id = NoteId::new(raw);
            assert_eq!(
                store.remove(&id).await,
                Outcome::Dropped(BackendError::NotFound(id.clone()))
            );
        }
        let id = NoteId::new("known?typo");
        assert_eq!(
            store.update(&id, "Groceries", "bread").await,
            Outcome::Dropped(BackendError::NotFound(id))
        );

        let seen = stub.seen_ids.lock().clone();
        assert_eq!(seen, vec!["known?typo", "known#frag", "known/extra", "known?typo"]);
        assert_eq!(store.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_create_keeps_list() {
        let (_stub, base) = serve_stub().await;
        let backend: Arc<dyn NotesBackend> = Arc::new(HttpBackend::new(&base).unwrap());
        let store = NotesStore::new(backend, RefreshPolicy::Reload);
        store.load().await;
        let before = store.notes();

        assert_eq!(
            store.create("Groceries", "milk").await,
            Outcome::Dropped(BackendError::ValidationRejected("title is empty".to_string()))
        );
        assert_eq!(store.notes(), before);
    }

    #[tokio::test]
    async fn test_feed_frames_become_snapshots() {
        let (_stub, base) = serve_stub().await;
        let backend = HttpBackend::new(&base).unwrap();
        let cancel = CancellationToken::new();
        let mut rx = backend.watch_all(cancel.clone()).await.unwrap();

        // The malformed frame is skipped; the snapshot behind it arrives
        let notes = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            notes,
            vec![
                Note::with_id("a", "Groceries", "milk, eggs"),
                Note::with_id("b", "Work", "finish report"),
            ]
        );

        cancel.cancel();
        let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(ended.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) is not expected to run an HTTP server
        let backend = HttpBackend::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            backend.fetch_all().await,
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(
            backend.watch_all(CancellationToken::new()).await,
            Err(BackendError::Unavailable(_))
        ));
    }
}
