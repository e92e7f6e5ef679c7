// src/infrastructure/sqlite.rs
use crate::application::{NoteRepository, RemoteResult};
use crate::domain::{Image, ImageId, Note, NoteId, Notebook, NotebookId, RemoteError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS notebooks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        notebook_id INTEGER NOT NULL REFERENCES notebooks(id) ON DELETE CASCADE,
        title TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS images (
        id TEXT NOT NULL,
        note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        filename TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (id, note_id)
    );
";

const NOTE_COLUMNS: &str = "id, notebook_id, title, content, created_at, updated_at, deleted";

/// Local SQLite database standing in for the remote note service.
///
/// Deleting a notebook removes its notes (trashed ones included) and their
/// images. Image ids are the SHA-256 of the image bytes.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "Opening note database");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let repo = Self::with_connection(conn, Some(path.clone()))?;
        info!(?path, "Opened note database");
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a single note by id, trashed or not.
    pub async fn find_note(&self, note_id: NoteId) -> RemoteResult<Option<Note>> {
        self.run("load note", move |conn| {
            conn.query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![note_id.0],
                note_from_row,
            )
            .optional()
        })
        .await
    }

    /// Metadata of the images attached to a note, without payloads.
    pub async fn list_images(&self, note_id: NoteId) -> RemoteResult<Vec<Image>> {
        self.run("list images", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, note_id, filename, mime_type FROM images WHERE note_id = ?1 ORDER BY filename",
            )?;
            let images = stmt
                .query_map(params![note_id.0], |row| {
                    Ok(Image {
                        id: ImageId::new(row.get::<_, String>(0)?),
                        note_id: NoteId(row.get(1)?),
                        filename: row.get(2)?,
                        mime_type: row.get(3)?,
                        bytes: Vec::new(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(images)
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, operation: &'static str, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| RemoteError::new(format!("Failed to {operation}: {e}")))?
        .map_err(|e| to_remote_error(operation, e))
    }
}

fn to_remote_error(operation: &str, err: rusqlite::Error) -> RemoteError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => {
            RemoteError::new(format!("Failed to {operation}: not found"))
        }
        other => RemoteError::new(format!("Failed to {operation}: {other}")),
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: NoteId(row.get(0)?),
        notebook_id: NotebookId(row.get(1)?),
        title: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted: row.get(6)?,
    })
}

/// Fails with `QueryReturnedNoRows` when the statement touched nothing.
fn expect_changed(changed: usize) -> rusqlite::Result<()> {
    if changed == 0 {
        Err(rusqlite::Error::QueryReturnedNoRows)
    } else {
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for SqliteRepository {
    #[instrument(level = "debug", skip(self))]
    async fn get_notebooks(&self) -> RemoteResult<Vec<Notebook>> {
        self.run("load notebooks", |conn| {
            let mut stmt = conn.prepare("SELECT id, title FROM notebooks ORDER BY id")?;
            let notebooks = stmt
                .query_map([], |row| {
                    Ok(Notebook {
                        id: NotebookId(row.get(0)?),
                        title: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notebooks)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_notebook(&self, title: &str) -> RemoteResult<Notebook> {
        let title = title.to_string();
        self.run("create notebook", move |conn| {
            conn.execute("INSERT INTO notebooks (title) VALUES (?1)", params![title])?;
            Ok(Notebook {
                id: NotebookId(conn.last_insert_rowid()),
                title,
            })
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_notebook(&self, notebook_id: NotebookId) -> RemoteResult<()> {
        self.run("delete notebook", move |conn| {
            let changed =
                conn.execute("DELETE FROM notebooks WHERE id = ?1", params![notebook_id.0])?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_notes(&self, notebook_id: NotebookId) -> RemoteResult<Vec<Note>> {
        self.run("load notes", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes WHERE notebook_id = ?1 AND deleted = 0 ORDER BY id"
            ))?;
            let notes = stmt
                .query_map(params![notebook_id.0], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_note(&self, notebook_id: NotebookId, title: &str) -> RemoteResult<Note> {
        let title = title.to_string();
        self.run("create note", move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO notes (notebook_id, title, content, created_at, updated_at)
                 VALUES (?1, ?2, '', ?3, ?3)",
                params![notebook_id.0, title, now],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id],
                note_from_row,
            )
        })
        .await
    }

    #[instrument(level = "debug", skip(self, new_title))]
    async fn update_note_title(&self, note_id: NoteId, new_title: &str) -> RemoteResult<()> {
        let title = new_title.to_string();
        self.run("save title", move |conn| {
            let changed = conn.execute(
                "UPDATE notes SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now(), note_id.0],
            )?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self, new_content), fields(len = new_content.len()))]
    async fn update_note_content(&self, note_id: NoteId, new_content: &str) -> RemoteResult<()> {
        let content = new_content.to_string();
        self.run("save content", move |conn| {
            let changed = conn.execute(
                "UPDATE notes SET content = ?1, updated_at = ?2 WHERE id = ?3",
                params![content, Utc::now(), note_id.0],
            )?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn update_note_notebook(
        &self,
        note_id: NoteId,
        new_notebook_id: NotebookId,
    ) -> RemoteResult<()> {
        self.run("move note", move |conn| {
            let changed = conn.execute(
                "UPDATE notes SET notebook_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_notebook_id.0, Utc::now(), note_id.0],
            )?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_note(&self, note_id: NoteId) -> RemoteResult<()> {
        self.run("delete note", move |conn| {
            let changed = conn.execute(
                "UPDATE notes SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                params![note_id.0],
            )?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_deleted_notes(&self) -> RemoteResult<Vec<Note>> {
        self.run("load trash", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes WHERE deleted = 1 ORDER BY updated_at DESC, id"
            ))?;
            let notes = stmt
                .query_map([], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn restore_note(&self, note_id: NoteId) -> RemoteResult<()> {
        self.run("restore note", move |conn| {
            let changed = conn.execute(
                "UPDATE notes SET deleted = 0 WHERE id = ?1 AND deleted = 1",
                params![note_id.0],
            )?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn permanently_delete_note(&self, note_id: NoteId) -> RemoteResult<()> {
        self.run("delete note permanently", move |conn| {
            let changed = conn.execute("DELETE FROM notes WHERE id = ?1", params![note_id.0])?;
            expect_changed(changed)
        })
        .await
    }

    #[instrument(level = "debug", skip(self, bytes), fields(size = bytes.len()))]
    async fn save_image(
        &self,
        note_id: NoteId,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> RemoteResult<ImageId> {
        let id = ImageId::from_content(bytes);
        let (bytes, filename, mime_type) = (bytes.to_vec(), filename.to_string(), mime_type.to_string());
        let stored = id.clone();
        self.run("save image", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO images (id, note_id, filename, mime_type, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![stored.as_str(), note_id.0, filename, mime_type, bytes],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_image(&self, image_id: &ImageId) -> RemoteResult<Vec<u8>> {
        let id = image_id.clone();
        let data = self
            .run("load image", move |conn| {
                conn.query_row(
                    "SELECT data FROM images WHERE id = ?1 LIMIT 1",
                    params![id.as_str()],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()
            })
            .await?;
        data.ok_or_else(|| RemoteError::new(format!("Image not found: {image_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seeded() -> (SqliteRepository, Notebook, Note) {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let notebook = repo.create_notebook("Work").await.unwrap();
        let note = repo.create_note(notebook.id, "Draft").await.unwrap();
        (repo, notebook, note)
    }

    #[tokio::test]
    async fn given_new_note_when_created_then_is_empty_and_timestamped() {
        let (_repo, notebook, note) = seeded().await;

        assert_eq!(note.notebook_id, notebook.id);
        assert_eq!(note.title, "Draft");
        assert_eq!(note.content, "");
        assert_eq!(note.created_at, note.updated_at);
        assert!(!note.deleted);
    }

    #[tokio::test]
    async fn given_title_update_when_saved_then_content_is_untouched() {
        let (repo, notebook, note) = seeded().await;
        repo.update_note_content(note.id, "body").await.unwrap();

        repo.update_note_title(note.id, "Final").await.unwrap();

        let stored = &repo.get_notes(notebook.id).await.unwrap()[0];
        assert_eq!(stored.title, "Final");
        assert_eq!(stored.content, "body");
        assert!(stored.updated_at >= note.updated_at);
    }

    #[tokio::test]
    async fn given_soft_deleted_note_when_listing_then_only_trash_has_it() {
        let (repo, notebook, note) = seeded().await;

        repo.delete_note(note.id).await.unwrap();

        assert!(repo.get_notes(notebook.id).await.unwrap().is_empty());
        let trash = repo.get_deleted_notes().await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].notebook_id, notebook.id);

        repo.restore_note(note.id).await.unwrap();
        assert_eq!(repo.get_notes(notebook.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn given_trashed_note_when_finding_then_still_returned() {
        let (repo, _notebook, note) = seeded().await;
        repo.delete_note(note.id).await.unwrap();

        let found = repo.find_note(note.id).await.unwrap().unwrap();

        assert!(found.deleted);
        assert!(repo.find_note(NoteId(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn given_unknown_note_when_updating_then_reports_not_found() {
        let (repo, _notebook, _note) = seeded().await;

        let err = repo.update_note_title(NoteId(999), "x").await.unwrap_err();

        assert!(err.message.contains("not found"));
    }

    #[tokio::test]
    async fn given_notebook_with_notes_and_images_when_deleted_then_cascades() {
        let (repo, notebook, note) = seeded().await;
        let id = repo
            .save_image(note.id, b"\x89PNG", "a.png", "image/png")
            .await
            .unwrap();
        repo.delete_note(note.id).await.unwrap();

        repo.delete_notebook(notebook.id).await.unwrap();

        assert!(repo.get_notebooks().await.unwrap().is_empty());
        assert!(repo.get_deleted_notes().await.unwrap().is_empty());
        assert!(repo.get_image(&id).await.is_err());
    }

    #[tokio::test]
    async fn given_same_bytes_when_saved_twice_then_id_is_stable() {
        let (repo, _notebook, note) = seeded().await;

        let first = repo.save_image(note.id, b"img", "a.png", "image/png").await.unwrap();
        let second = repo.save_image(note.id, b"img", "b.png", "image/png").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.get_image(&first).await.unwrap(), b"img");
        assert_eq!(repo.list_images(note.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn given_database_file_when_reopened_then_data_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("notes.db");
        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.create_notebook("Work").await.unwrap();
        }

        let reopened = SqliteRepository::open(&path).unwrap();

        assert_eq!(reopened.get_notebooks().await.unwrap()[0].title, "Work");
        assert_eq!(reopened.path(), Some(path.as_path()));
    }
}
