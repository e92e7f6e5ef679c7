// src/application/repository.rs
use crate::domain::{ImageId, Note, NoteId, Notebook, NotebookId, RemoteError};
use async_trait::async_trait;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Typed call surface over the remote note service.
///
/// Stateless request/response. Implementations report failures as
/// [`RemoteError`] and never retry.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn get_notebooks(&self) -> RemoteResult<Vec<Notebook>>;
    async fn create_notebook(&self, title: &str) -> RemoteResult<Notebook>;
    async fn delete_notebook(&self, notebook_id: NotebookId) -> RemoteResult<()>;

    /// Active (not trashed) notes of a notebook
    async fn get_notes(&self, notebook_id: NotebookId) -> RemoteResult<Vec<Note>>;
    async fn create_note(&self, notebook_id: NotebookId, title: &str) -> RemoteResult<Note>;
    async fn update_note_title(&self, note_id: NoteId, new_title: &str) -> RemoteResult<()>;
    async fn update_note_content(&self, note_id: NoteId, new_content: &str) -> RemoteResult<()>;
    async fn update_note_notebook(
        &self,
        note_id: NoteId,
        new_notebook_id: NotebookId,
    ) -> RemoteResult<()>;

    /// Soft delete: the note keeps its notebook and can be restored
    async fn delete_note(&self, note_id: NoteId) -> RemoteResult<()>;
    async fn get_deleted_notes(&self) -> RemoteResult<Vec<Note>>;
    async fn restore_note(&self, note_id: NoteId) -> RemoteResult<()>;
    async fn permanently_delete_note(&self, note_id: NoteId) -> RemoteResult<()>;

    async fn save_image(
        &self,
        note_id: NoteId,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> RemoteResult<ImageId>;
    async fn get_image(&self, image_id: &ImageId) -> RemoteResult<Vec<u8>>;
}
