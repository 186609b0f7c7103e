//! SQLite-backed note documents.
//!
//! One row per document. List order is insertion order (`rowid`), which a
//! replace does not change.

use chrono::Utc;
use notes_service_types::{NoteDoc, NoteInput};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &str) -> SqliteResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All notes in insertion order
    pub fn list_notes(&self) -> SqliteResult<Vec<NoteDoc>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, title, content, created_at, updated_at FROM notes ORDER BY rowid",
        )?;

        let notes = stmt
            .query_map([], row_to_doc)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(notes)
    }

    pub fn count_notes(&self) -> SqliteResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Insert a new document with a fresh id
    pub fn insert_note(&self, input: &NoteInput) -> SqliteResult<NoteDoc> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, input.title, input.content, now],
        )?;

        log::debug!("[DB] Inserted note {}", id);

        Ok(NoteDoc {
            id,
            title: input.title.clone(),
            content: input.content.clone(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        })
    }

    /// Replace title and content. Returns `None` if the id is unknown.
    pub fn replace_note(&self, id: &str, input: &NoteInput) -> SqliteResult<Option<NoteDoc>> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let changed = conn.execute(
            "UPDATE notes SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![input.title, input.content, now, id],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        conn.query_row(
            "SELECT id, title, content, created_at, updated_at FROM notes WHERE id = ?1",
            params![id],
            row_to_doc,
        )
        .optional()
    }

    /// Delete a document. Returns false if the id is unknown.
    pub fn delete_note(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

fn row_to_doc(row: &rusqlite::Row<'_>) -> SqliteResult<NoteDoc> {
    Ok(NoteDoc {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
