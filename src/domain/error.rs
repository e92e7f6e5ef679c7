// src/domain/error.rs
use crate::domain::{ImageId, NoteId, NotebookId};
use thiserror::Error;

/// Failure reported by the remote boundary. Carries the message as received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("Action declined by user")]
    Declined,
    #[error("Notebook not found: {0}")]
    NotebookNotFound(NotebookId),
    #[error("Note not found: {0}")]
    NoteNotFound(NoteId),
    #[error("No notebook selected")]
    NoNotebookSelected,
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Errors from the image attach/resolve path.
///
/// `UnsupportedType` and `TooLarge` are raised before any remote call and are
/// meant to be shown next to the upload control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Unsupported file type: {0} (only images can be attached)")]
    UnsupportedType(String),
    #[error("Image is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("No note is open in the editor")]
    NoNoteOpen,
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("Failed to materialize image {id}: {message}")]
    Io { id: ImageId, message: String },
}

impl ImageError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ImageError::UnsupportedType(_) | ImageError::TooLarge { .. }
        )
    }
}
