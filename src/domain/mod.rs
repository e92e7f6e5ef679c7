// src/domain/mod.rs
pub mod error;
pub mod image;
pub mod note;
pub mod notebook;

pub use error::{DomainError, ImageError, RemoteError};
pub use image::{Image, ImageId};
pub use note::{Note, NoteField, NoteId};
pub use notebook::{Notebook, NotebookId};
