//! Shared types for the notes service and its HTTP/WebSocket clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Request Types
// =====================================================

/// Body of `POST /notes/add` and `PUT /notes/:id`.
///
/// A replace always carries both fields; there is no partial patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NoteInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Name of the first field that is blank after trimming, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("title")
        } else if self.content.trim().is_empty() {
            Some("content")
        } else {
            None
        }
    }
}

// =====================================================
// Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Domain Types
// =====================================================

/// A stored note document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDoc {
    /// Document id. `_id` is accepted for document-database style payloads.
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Frames pushed over `GET /notes/watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Full collection in insertion order.
    Snapshot { notes: Vec<NoteDoc> },
}

/// Service health status
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub version: String,
    pub uptime_secs: u64,
    pub note_count: usize,
    pub watchers: usize,
}
