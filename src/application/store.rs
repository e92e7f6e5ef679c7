// src/application/store.rs
use crate::application::projection::{self, SortDirection, SortKey, ViewParams};
use crate::application::NoteRepository;
use crate::domain::{DomainError, Note, NoteId, Notebook, NotebookId, RemoteError};
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Store operation that can fail remotely, used to place error messages in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LoadNotebooks,
    SelectNotebook,
    CreateNotebook,
    DeleteNotebook,
    CreateNote,
    UpdateTitle,
    UpdateContent,
    MoveNote,
    DeleteNote,
    ListTrash,
    RestoreNote,
    PurgeNote,
    EmptyTrash,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::LoadNotebooks => "load notebooks",
            Operation::SelectNotebook => "load notes",
            Operation::CreateNotebook => "create notebook",
            Operation::DeleteNotebook => "delete notebook",
            Operation::CreateNote => "create note",
            Operation::UpdateTitle => "save title",
            Operation::UpdateContent => "save content",
            Operation::MoveNote => "move note",
            Operation::DeleteNote => "delete note",
            Operation::ListTrash => "load trash",
            Operation::RestoreNote => "restore note",
            Operation::PurgeNote => "delete note permanently",
            Operation::EmptyTrash => "empty trash",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub operation: Operation,
    pub message: String,
}

/// Whether re-fetching a notebook's notes keeps the current note selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSelection {
    Clear,
    Preserve,
}

/// Result of a note fetch that reached the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetched notes replaced the mirror
    Applied,
    /// A newer selection or a delete of the target notebook overtook the
    /// fetch; local state is unchanged
    Superseded,
}

/// Latest issued note fetch.
#[derive(Debug, Default)]
struct FetchTicket {
    seq: u64,
    target: Option<NotebookId>,
}

impl FetchTicket {
    fn issue(&mut self, notebook_id: NotebookId) -> u64 {
        self.seq += 1;
        self.target = Some(notebook_id);
        self.seq
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.seq == ticket
    }

    fn invalidate(&mut self) {
        self.seq += 1;
        self.target = None;
    }

    /// Invalidate the pending fetch only if it targets `notebook_id`.
    fn invalidate_target(&mut self, notebook_id: NotebookId) -> bool {
        if self.target == Some(notebook_id) {
            self.invalidate();
            true
        } else {
            false
        }
    }
}

/// Immutable snapshot of the session. Every mutation publishes a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub notebooks: Vec<Notebook>,
    pub selected_notebook: Option<NotebookId>,
    pub selected_note: Option<NoteId>,
    /// Canonical notes of the selected notebook
    pub all_notes: Vec<Note>,
    /// Visible projection of `all_notes`
    pub notes: Vec<Note>,
    pub view: ViewParams,
    /// Trashed notes as of the last `list_trash`; may be stale
    pub trash: Vec<Note>,
    pub last_error: Option<OperationError>,
}

impl StoreState {
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.all_notes.iter().find(|n| n.id == id && !n.deleted)
    }

    pub fn selected(&self) -> Option<&Note> {
        self.selected_note.and_then(|id| self.note(id))
    }

    pub fn notebook(&self, id: NotebookId) -> Option<&Notebook> {
        self.notebooks.iter().find(|nb| nb.id == id)
    }

    pub fn trash_count(&self) -> usize {
        self.trash.len()
    }

    pub(crate) fn reproject(&mut self) {
        self.notes = projection::project(&self.all_notes, self.selected_notebook, &self.view);
    }

    pub(crate) fn clear_error(&mut self, operation: Operation) {
        if self
            .last_error
            .as_ref()
            .is_some_and(|e| e.operation == operation)
        {
            self.last_error = None;
        }
    }

    fn clear_notebook_selection(&mut self) {
        self.selected_notebook = None;
        self.selected_note = None;
        self.all_notes.clear();
        self.notes.clear();
    }
}

/// Single source of truth for notebooks, the active notebook's notes and
/// the selection.
///
/// Local state only changes after the remote call resolved successfully.
pub struct NoteStore<R: NoteRepository> {
    repository: Arc<R>,
    state: watch::Sender<Arc<StoreState>>,
    // latest note fetch; older responses are dropped
    fetch: Mutex<FetchTicket>,
}

impl<R: NoteRepository> NoteStore<R> {
    pub fn new(repository: Arc<R>) -> Self {
        let (state, _) = watch::channel(Arc::new(StoreState::default()));
        Self {
            repository,
            state,
            fetch: Mutex::new(FetchTicket::default()),
        }
    }

    fn fetch_ticket(&self) -> MutexGuard<'_, FetchTicket> {
        self.fetch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn snapshot(&self) -> Arc<StoreState> {
        self.state.borrow().clone()
    }

    /// Receiver that is notified with every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreState>> {
        self.state.subscribe()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StoreState)) {
        self.state.send_modify(|current| {
            let mut next = StoreState::clone(current);
            f(&mut next);
            *current = Arc::new(next);
        });
    }

    pub(crate) fn fail(&self, operation: Operation, err: RemoteError) -> DomainError {
        error!(%operation, error = %err, "Remote call failed");
        let message = err.message.clone();
        self.update(|s| s.last_error = Some(OperationError { operation, message }));
        DomainError::Remote(err)
    }

    /// Clear all in-memory collections at session end.
    pub fn teardown(&self) {
        info!("Tearing down note store");
        self.fetch_ticket().invalidate();
        self.state.send_replace(Arc::new(StoreState::default()));
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn load_notebooks(&self) -> Result<Vec<Notebook>, DomainError> {
        let notebooks = self
            .repository
            .get_notebooks()
            .await
            .map_err(|e| self.fail(Operation::LoadNotebooks, e))?;
        debug!(count = notebooks.len(), "Loaded notebooks");

        let loaded = notebooks.clone();
        self.update(move |s| {
            if let Some(active) = s.selected_notebook {
                if !loaded.iter().any(|nb| nb.id == active) {
                    debug!(notebook_id = %active, "Selected notebook vanished, clearing selection");
                    s.clear_notebook_selection();
                }
            }
            s.notebooks = loaded;
            s.clear_error(Operation::LoadNotebooks);
        });
        Ok(notebooks)
    }

    /// Make `notebook_id` active and replace its notes with a fresh fetch.
    ///
    /// Returns [`FetchOutcome::Superseded`] when a later selection, or the
    /// deletion of `notebook_id`, overtook the fetch.
    #[instrument(level = "debug", skip(self))]
    pub async fn select_notebook(
        &self,
        notebook_id: NotebookId,
        selection: NoteSelection,
    ) -> Result<FetchOutcome, DomainError> {
        let ticket = self.fetch_ticket().issue(notebook_id);
        let notes = self
            .repository
            .get_notes(notebook_id)
            .await
            .map_err(|e| self.fail(Operation::SelectNotebook, e))?;

        // checked and applied under the ticket lock so a delete cannot slip in between
        let fetch = self.fetch_ticket();
        if !fetch.is_current(ticket) {
            debug!(notebook_id = %notebook_id, "Dropping superseded note fetch");
            return Ok(FetchOutcome::Superseded);
        }

        debug!(notebook_id = %notebook_id, count = notes.len(), "Loaded notes");
        self.update(move |s| {
            s.selected_notebook = Some(notebook_id);
            s.all_notes = notes;
            match selection {
                NoteSelection::Clear => s.selected_note = None,
                NoteSelection::Preserve => {
                    if s.selected_note.is_some_and(|id| s.note(id).is_none()) {
                        s.selected_note = None;
                    }
                }
            }
            s.reproject();
            s.clear_error(Operation::SelectNotebook);
        });
        drop(fetch);
        Ok(FetchOutcome::Applied)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn create_notebook(&self, title: &str) -> Result<Notebook, DomainError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("title", "Notebook title cannot be empty"));
        }

        let notebook = self
            .repository
            .create_notebook(title)
            .await
            .map_err(|e| self.fail(Operation::CreateNotebook, e))?;
        info!(notebook_id = %notebook.id, "Created notebook");
        self.update(|s| s.clear_error(Operation::CreateNotebook));

        if let Err(e) = self.load_notebooks().await {
            warn!(error = %e, "Notebook re-sync failed, appending locally");
            let created = notebook.clone();
            self.update(move |s| {
                if s.notebook(created.id).is_none() {
                    s.notebooks.push(created);
                }
            });
        }
        Ok(notebook)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn delete_notebook(&self, notebook_id: NotebookId) -> Result<(), DomainError> {
        self.repository
            .delete_notebook(notebook_id)
            .await
            .map_err(|e| self.fail(Operation::DeleteNotebook, e))?;
        info!(notebook_id = %notebook_id, "Deleted notebook");

        {
            // a pending fetch of the deleted notebook must not resurrect it
            let mut fetch = self.fetch_ticket();
            if fetch.invalidate_target(notebook_id) {
                debug!(notebook_id = %notebook_id, "Cancelled note fetch of deleted notebook");
            }
            self.update(|s| {
                if s.selected_notebook == Some(notebook_id) {
                    s.clear_notebook_selection();
                }
                s.notebooks.retain(|nb| nb.id != notebook_id);
                s.clear_error(Operation::DeleteNotebook);
            });
        }

        if let Err(e) = self.load_notebooks().await {
            warn!(error = %e, "Notebook re-sync failed after delete");
        }
        Ok(())
    }

    /// Create a note, then re-fetch the active notebook if it is the target.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_note(
        &self,
        notebook_id: NotebookId,
        title: &str,
        selection: NoteSelection,
    ) -> Result<Note, DomainError> {
        let note = self
            .repository
            .create_note(notebook_id, title)
            .await
            .map_err(|e| self.fail(Operation::CreateNote, e))?;
        info!(note_id = %note.id, notebook_id = %notebook_id, "Created note");
        self.update(|s| s.clear_error(Operation::CreateNote));

        if self.snapshot().selected_notebook == Some(notebook_id) {
            let refetched = match self.select_notebook(notebook_id, selection).await {
                Ok(FetchOutcome::Applied) => true,
                Ok(FetchOutcome::Superseded) => {
                    debug!(note_id = %note.id, "Note re-fetch superseded");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "Note re-fetch failed");
                    false
                }
            };
            if !refetched {
                debug!(note_id = %note.id, "Inserting created note locally");
                let created = note.clone();
                self.update(move |s| {
                    if s.selected_notebook == Some(notebook_id) && s.note(created.id).is_none() {
                        s.all_notes.push(created);
                        s.reproject();
                    }
                });
            }
        }
        Ok(note)
    }

    /// Create a titled note in the selected notebook and clear the selection.
    pub async fn add_note(&self, title: &str) -> Result<Note, DomainError> {
        if title.trim().is_empty() {
            return Err(DomainError::validation("title", "Note title cannot be empty"));
        }
        let notebook_id = self
            .snapshot()
            .selected_notebook
            .ok_or(DomainError::NoNotebookSelected)?;
        self.create_note(notebook_id, title.trim(), NoteSelection::Clear)
            .await
    }

    /// Create an untitled note in the selected notebook and select it.
    ///
    /// The note is only selected if it is resident afterwards, e.g. not when
    /// its notebook was deleted while the note list was re-fetched.
    pub async fn create_blank_note(&self) -> Result<Note, DomainError> {
        let notebook_id = self
            .snapshot()
            .selected_notebook
            .ok_or(DomainError::NoNotebookSelected)?;
        let note = self
            .create_note(notebook_id, "", NoteSelection::Preserve)
            .await?;
        let id = note.id;
        self.update(move |s| {
            if s.note(id).is_some() {
                s.selected_note = Some(id);
            } else {
                debug!(note_id = %id, "Created note not resident, leaving selection");
            }
        });
        Ok(note)
    }

    /// Select a resident note. No fetch is issued.
    pub fn select_note(&self, note_id: NoteId) -> Result<(), DomainError> {
        if self.snapshot().note(note_id).is_none() {
            return Err(DomainError::NoteNotFound(note_id));
        }
        debug!(note_id = %note_id, "Selecting note");
        self.update(|s| s.selected_note = Some(note_id));
        Ok(())
    }

    #[instrument(level = "debug", skip(self, title))]
    pub async fn update_note_title(&self, note_id: NoteId, title: &str) -> Result<(), DomainError> {
        self.repository
            .update_note_title(note_id, title)
            .await
            .map_err(|e| self.fail(Operation::UpdateTitle, e))?;

        let title = title.to_string();
        self.patch_note(note_id, Operation::UpdateTitle, move |n| n.title = title);
        Ok(())
    }

    #[instrument(level = "debug", skip(self, content), fields(len = content.len()))]
    pub async fn update_note_content(
        &self,
        note_id: NoteId,
        content: &str,
    ) -> Result<(), DomainError> {
        self.repository
            .update_note_content(note_id, content)
            .await
            .map_err(|e| self.fail(Operation::UpdateContent, e))?;

        let content = content.to_string();
        self.patch_note(note_id, Operation::UpdateContent, move |n| {
            n.content = content
        });
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn move_note(
        &self,
        note_id: NoteId,
        notebook_id: NotebookId,
    ) -> Result<(), DomainError> {
        self.repository
            .update_note_notebook(note_id, notebook_id)
            .await
            .map_err(|e| self.fail(Operation::MoveNote, e))?;
        info!(note_id = %note_id, notebook_id = %notebook_id, "Moved note");

        self.patch_note(note_id, Operation::MoveNote, move |n| {
            n.notebook_id = notebook_id
        });
        self.update(|s| {
            if s.selected_note == Some(note_id) && s.selected_notebook != Some(notebook_id) {
                s.selected_note = None;
            }
        });
        Ok(())
    }

    /// Move a note to the trash.
    #[instrument(level = "debug", skip(self))]
    pub async fn soft_delete_note(&self, note_id: NoteId) -> Result<(), DomainError> {
        self.repository
            .delete_note(note_id)
            .await
            .map_err(|e| self.fail(Operation::DeleteNote, e))?;
        info!(note_id = %note_id, "Moved note to trash");

        self.update(|s| {
            s.all_notes.retain(|n| n.id != note_id);
            if s.selected_note == Some(note_id) {
                s.selected_note = None;
            }
            s.reproject();
            s.clear_error(Operation::DeleteNote);
        });
        Ok(())
    }

    pub fn search_notes(&self, query: &str) {
        let query = query.to_string();
        self.update(move |s| {
            s.view.set_query(query);
            s.reproject();
        });
    }

    pub fn sort_notes(&self, key: SortKey) -> SortDirection {
        let mut applied = SortDirection::Ascending;
        self.update(|s| {
            applied = s.view.toggle_sort(key);
            s.reproject();
        });
        applied
    }

    pub fn sort_notes_by_title(&self) -> SortDirection {
        self.sort_notes(SortKey::Title)
    }

    /// Apply a field change to the resident copy of a note and stamp `updated_at`.
    /// Notes that left the mirror in the meantime are skipped.
    fn patch_note(&self, note_id: NoteId, operation: Operation, f: impl FnOnce(&mut Note)) {
        self.update(|s| {
            let patched = match s.all_notes.iter_mut().find(|n| n.id == note_id) {
                Some(note) => {
                    f(note);
                    note.updated_at = Utc::now();
                    true
                }
                None => false,
            };
            if patched {
                s.reproject();
            } else {
                debug!(note_id = %note_id, "Note not resident, skipping local patch");
            }
            s.clear_error(operation);
        });
    }
}
