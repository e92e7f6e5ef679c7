// src/util/testing.rs

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::application::{Confirm, ConfirmRequest, NoteRepository, RemoteResult};
use crate::domain::{ImageId, Note, NoteId, Notebook, NotebookId, RemoteError};

/// Remote calls recorded by [`MockNoteRepository`], also used to inject failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    GetNotebooks,
    CreateNotebook,
    DeleteNotebook(NotebookId),
    GetNotes(NotebookId),
    CreateNote(NotebookId),
    UpdateTitle(NoteId),
    UpdateContent(NoteId),
    UpdateNotebook(NoteId),
    DeleteNote(NoteId),
    GetDeletedNotes,
    RestoreNote(NoteId),
    PermanentlyDeleteNote(NoteId),
    SaveImage(NoteId),
    GetImage(ImageId),
}

/// Fixed timestamp for seeded notes; `offset` keeps creation order stable.
pub fn seeded_time(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::seconds(offset)
}

/// Untrashed note with empty content and seeded timestamps.
pub fn note(id: i64, notebook_id: i64, title: &str) -> Note {
    Note {
        id: NoteId(id),
        notebook_id: NotebookId(notebook_id),
        title: title.to_string(),
        content: String::new(),
        created_at: seeded_time(id),
        updated_at: seeded_time(id),
        deleted: false,
    }
}

#[derive(Default)]
struct MockState {
    notebooks: BTreeMap<NotebookId, Notebook>,
    notes: BTreeMap<NoteId, Note>,
    images: HashMap<ImageId, (NoteId, Vec<u8>)>,
    next_id: i64,
    failing: HashSet<Call>,
    calls: Vec<Call>,
    // hand control back to the runtime before answering get_notes
    yield_on_fetch: bool,
}

/// In-memory stand-in for the remote note service.
///
/// Seeded through the builder, records every call and fails calls that
/// were registered with [`MockNoteRepository::fail_on`].
///
/// # Examples
///
/// ```
/// use notesync::domain::NoteId;
/// use notesync::util::testing::MockNoteRepository;
///
/// let mock = MockNoteRepository::builder()
///     .with_notebook(1, "Work")
///     .with_note(10, 1, "Draft")
///     .build();
///
/// assert_eq!(mock.note_title(NoteId(10)).as_deref(), Some("Draft"));
/// ```
pub struct MockNoteRepository {
    state: Mutex<MockState>,
}

impl MockNoteRepository {
    pub fn builder() -> MockNoteRepositoryBuilder {
        MockNoteRepositoryBuilder::new()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `call` fail.
    pub fn fail_on(&self, call: Call) {
        self.state().failing.insert(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn stored_note(&self, note_id: NoteId) -> Option<Note> {
        self.state().notes.get(&note_id).cloned()
    }

    pub fn note_title(&self, note_id: NoteId) -> Option<String> {
        self.stored_note(note_id).map(|n| n.title)
    }

    pub fn note_content(&self, note_id: NoteId) -> Option<String> {
        self.stored_note(note_id).map(|n| n.content)
    }

    pub fn image_count(&self) -> usize {
        self.state().images.len()
    }

    /// Record `call`; returns the guard unless the call is set to fail.
    fn begin(&self, call: Call) -> RemoteResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if state.failing.contains(&call) {
            debug!(?call, "Injected failure");
            return Err(RemoteError::new(format!("injected failure: {call:?}")));
        }
        Ok(state)
    }
}

fn missing_note(note_id: NoteId) -> RemoteError {
    RemoteError::new(format!("Note not found: {note_id}"))
}

fn touch_note(
    state: &mut MockState,
    note_id: NoteId,
    f: impl FnOnce(&mut Note),
) -> RemoteResult<()> {
    let note = state
        .notes
        .get_mut(&note_id)
        .ok_or_else(|| missing_note(note_id))?;
    f(note);
    note.updated_at = Utc::now();
    Ok(())
}

#[async_trait]
impl NoteRepository for MockNoteRepository {
    async fn get_notebooks(&self) -> RemoteResult<Vec<Notebook>> {
        let state = self.begin(Call::GetNotebooks)?;
        Ok(state.notebooks.values().cloned().collect())
    }

    async fn create_notebook(&self, title: &str) -> RemoteResult<Notebook> {
        let mut state = self.begin(Call::CreateNotebook)?;
        state.next_id += 1;
        let notebook = Notebook {
            id: NotebookId(state.next_id),
            title: title.to_string(),
        };
        state.notebooks.insert(notebook.id, notebook.clone());
        Ok(notebook)
    }

    async fn delete_notebook(&self, notebook_id: NotebookId) -> RemoteResult<()> {
        let mut state = self.begin(Call::DeleteNotebook(notebook_id))?;
        state
            .notebooks
            .remove(&notebook_id)
            .ok_or_else(|| RemoteError::new(format!("Notebook not found: {notebook_id}")))?;
        let doomed: HashSet<NoteId> = state
            .notes
            .values()
            .filter(|n| n.notebook_id == notebook_id)
            .map(|n| n.id)
            .collect();
        state.notes.retain(|id, _| !doomed.contains(id));
        state.images.retain(|_, (owner, _)| !doomed.contains(owner));
        Ok(())
    }

    async fn get_notes(&self, notebook_id: NotebookId) -> RemoteResult<Vec<Note>> {
        let yields = self.state().yield_on_fetch;
        if yields {
            tokio::task::yield_now().await;
        }
        let state = self.begin(Call::GetNotes(notebook_id))?;
        Ok(state
            .notes
            .values()
            .filter(|n| n.notebook_id == notebook_id && !n.deleted)
            .cloned()
            .collect())
    }

    async fn create_note(&self, notebook_id: NotebookId, title: &str) -> RemoteResult<Note> {
        let mut state = self.begin(Call::CreateNote(notebook_id))?;
        state.next_id += 1;
        let now = Utc::now();
        let note = Note {
            id: NoteId(state.next_id),
            notebook_id,
            title: title.to_string(),
            content: String::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
        };
        state.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update_note_title(&self, note_id: NoteId, new_title: &str) -> RemoteResult<()> {
        let mut state = self.begin(Call::UpdateTitle(note_id))?;
        touch_note(&mut state, note_id, |n| n.title = new_title.to_string())
    }

    async fn update_note_content(&self, note_id: NoteId, new_content: &str) -> RemoteResult<()> {
        let mut state = self.begin(Call::UpdateContent(note_id))?;
        touch_note(&mut state, note_id, |n| n.content = new_content.to_string())
    }

    async fn update_note_notebook(
        &self,
        note_id: NoteId,
        new_notebook_id: NotebookId,
    ) -> RemoteResult<()> {
        let mut state = self.begin(Call::UpdateNotebook(note_id))?;
        touch_note(&mut state, note_id, |n| n.notebook_id = new_notebook_id)
    }

    async fn delete_note(&self, note_id: NoteId) -> RemoteResult<()> {
        let mut state = self.begin(Call::DeleteNote(note_id))?;
        touch_note(&mut state, note_id, |n| n.deleted = true)
    }

    async fn get_deleted_notes(&self) -> RemoteResult<Vec<Note>> {
        let state = self.begin(Call::GetDeletedNotes)?;
        Ok(state.notes.values().filter(|n| n.deleted).cloned().collect())
    }

    async fn restore_note(&self, note_id: NoteId) -> RemoteResult<()> {
        let mut state = self.begin(Call::RestoreNote(note_id))?;
        touch_note(&mut state, note_id, |n| n.deleted = false)
    }

    async fn permanently_delete_note(&self, note_id: NoteId) -> RemoteResult<()> {
        let mut state = self.begin(Call::PermanentlyDeleteNote(note_id))?;
        state
            .notes
            .remove(&note_id)
            .ok_or_else(|| missing_note(note_id))?;
        state.images.retain(|_, (owner, _)| *owner != note_id);
        Ok(())
    }

    async fn save_image(
        &self,
        note_id: NoteId,
        bytes: &[u8],
        _filename: &str,
        _mime_type: &str,
    ) -> RemoteResult<ImageId> {
        let mut state = self.begin(Call::SaveImage(note_id))?;
        let id = ImageId::from_content(bytes);
        state.images.insert(id.clone(), (note_id, bytes.to_vec()));
        Ok(id)
    }

    async fn get_image(&self, image_id: &ImageId) -> RemoteResult<Vec<u8>> {
        let state = self.begin(Call::GetImage(image_id.clone()))?;
        state
            .images
            .get(image_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| RemoteError::new(format!("Image not found: {image_id}")))
    }
}

/// Builder for MockNoteRepository
///
/// Provides a fluent interface for seeding the mock service.
pub struct MockNoteRepositoryBuilder {
    state: MockState,
}

impl MockNoteRepositoryBuilder {
    pub fn new() -> Self {
        Self {
            state: MockState::default(),
        }
    }

    fn bump_ids(&mut self, id: i64) {
        self.state.next_id = self.state.next_id.max(id);
    }

    pub fn with_notebook(mut self, id: i64, title: &str) -> Self {
        self.bump_ids(id);
        self.state.notebooks.insert(
            NotebookId(id),
            Notebook {
                id: NotebookId(id),
                title: title.to_string(),
            },
        );
        self
    }

    pub fn with_note(mut self, id: i64, notebook_id: i64, title: &str) -> Self {
        self.bump_ids(id);
        self.state.notes.insert(NoteId(id), note(id, notebook_id, title));
        self
    }

    /// Seed a note that is already in the trash
    pub fn with_trashed_note(mut self, id: i64, notebook_id: i64, title: &str) -> Self {
        self.bump_ids(id);
        let mut trashed = note(id, notebook_id, title);
        trashed.deleted = true;
        self.state.notes.insert(NoteId(id), trashed);
        self
    }

    /// Seed an image owned by no particular note; its id is the content hash
    pub fn with_image(mut self, bytes: &[u8]) -> Self {
        self.state
            .images
            .insert(ImageId::from_content(bytes), (NoteId(0), bytes.to_vec()));
        self
    }

    /// Let other futures run while a `get_notes` call is in flight
    pub fn with_yielding_fetches(mut self) -> Self {
        self.state.yield_on_fetch = true;
        self
    }

    pub fn build(self) -> MockNoteRepository {
        MockNoteRepository {
            state: Mutex::new(self.state),
        }
    }
}

impl Default for MockNoteRepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Says yes to everything and remembers what it was asked.
#[derive(Default)]
pub struct AlwaysConfirm {
    requests: Mutex<Vec<ConfirmRequest>>,
}

impl AlwaysConfirm {
    pub fn requests(&self) -> Vec<ConfirmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Confirm for AlwaysConfirm {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        true
    }
}

pub struct AlwaysDecline;

#[async_trait]
impl Confirm for AlwaysDecline {
    async fn confirm(&self, _request: &ConfirmRequest) -> bool {
        false
    }
}

pub fn init_test_setup() -> Result<()> {
    // Set up logging first
    setup_test_logging();

    info!("Test Setup complete");
    Ok(())
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "trace");
    }

    // Create a filter for noisy modules
    let noisy_modules = ["rusqlite", "tokio", "mio"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        init_test_setup().expect("Failed to initialize test setup");
    }

    #[tokio::test]
    async fn given_injected_failure_when_calling_then_records_call_and_errors() {
        let mock = MockNoteRepository::builder().with_notebook(1, "Work").build();
        mock.fail_on(Call::GetNotebooks);

        let result = mock.get_notebooks().await;

        assert!(result.is_err());
        assert_eq!(mock.calls(), vec![Call::GetNotebooks]);
    }

    #[tokio::test]
    async fn given_seeded_notes_when_creating_then_ids_do_not_collide() {
        let mock = MockNoteRepository::builder()
            .with_notebook(1, "Work")
            .with_note(10, 1, "Draft")
            .build();

        let created = mock.create_note(NotebookId(1), "New").await.unwrap();

        assert_eq!(created.id, NoteId(11));
        assert_eq!(mock.get_notes(NotebookId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn given_trashed_note_when_listing_then_only_trash_returns_it() {
        let mock = MockNoteRepository::builder()
            .with_notebook(1, "Work")
            .with_trashed_note(7, 1, "Old")
            .build();

        assert!(mock.get_notes(NotebookId(1)).await.unwrap().is_empty());
        assert_eq!(mock.get_deleted_notes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn given_notebook_with_notes_when_deleting_then_cascades_to_notes_and_images() {
        let mock = MockNoteRepository::builder()
            .with_notebook(1, "Work")
            .with_note(10, 1, "Draft")
            .build();
        mock.save_image(NoteId(10), b"img", "a.png", "image/png")
            .await
            .unwrap();

        mock.delete_notebook(NotebookId(1)).await.unwrap();

        assert!(mock.stored_note(NoteId(10)).is_none());
        assert_eq!(mock.image_count(), 0);
    }
}
