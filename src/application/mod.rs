// src/application/mod.rs
pub mod editor;
pub mod image_cache;
pub mod projection;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod trash;

pub use editor::{EditorOptions, NavigationPolicy, NoteEditor};
pub use image_cache::{ImageCache, ImageHandle, ImageLookup};
pub use projection::{SortDirection, SortKey, ViewParams};
pub use repository::{NoteRepository, RemoteResult};
pub use scheduler::WriteBackScheduler;
pub use session::Session;
pub use store::{FetchOutcome, NoteSelection, NoteStore, Operation, OperationError, StoreState};
pub use trash::{Confirm, ConfirmRequest, EmptyTrashReport};
