// src/application/trash.rs
use crate::application::store::{FetchOutcome, NoteSelection, Operation, OperationError};
use crate::application::{NoteRepository, NoteStore};
use crate::constants::UNKNOWN_NOTEBOOK;
use crate::domain::{DomainError, Note, NoteId, NotebookId, RemoteError};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// Destructive or structural actions that need an explicit yes from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRequest {
    Restore {
        note_title: String,
        notebook_title: String,
    },
    PermanentDelete {
        note_title: String,
    },
    EmptyTrash {
        count: usize,
    },
}

impl ConfirmRequest {
    pub fn title(&self) -> &'static str {
        match self {
            ConfirmRequest::Restore { .. } => "Restore note",
            ConfirmRequest::PermanentDelete { .. } => "Permanent deletion",
            ConfirmRequest::EmptyTrash { .. } => "Empty the trash",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConfirmRequest::Restore {
                note_title,
                notebook_title,
            } => format!("Restore \"{note_title}\" to \"{notebook_title}\" notebook?"),
            ConfirmRequest::PermanentDelete { note_title } => format!(
                "Permanently delete \"{note_title}\"? This action cannot be undone."
            ),
            ConfirmRequest::EmptyTrash { count } => format!(
                "Empty trash? This will permanently delete {count} note(s)."
            ),
        }
    }
}

/// Asks the user. Declining aborts the action with no state change.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, request: &ConfirmRequest) -> bool;
}

/// Outcome of emptying the trash. Every item is attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmptyTrashReport {
    pub purged: Vec<NoteId>,
    pub failed: Vec<(NoteId, RemoteError)>,
}

impl EmptyTrashReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<R: NoteRepository> NoteStore<R> {
    /// Title of a notebook for display in the trash view.
    pub fn notebook_title(&self, notebook_id: NotebookId) -> String {
        self.snapshot()
            .notebook(notebook_id)
            .map(|nb| nb.title.clone())
            .unwrap_or_else(|| UNKNOWN_NOTEBOOK.to_string())
    }

    /// Fetch the trashed notes. The trash is only loaded on demand and may be
    /// stale until this is called again.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_trash(&self) -> Result<Vec<Note>, DomainError> {
        let trashed = self
            .repository()
            .get_deleted_notes()
            .await
            .map_err(|e| self.fail(Operation::ListTrash, e))?;
        debug!(count = trashed.len(), "Loaded trash");

        let loaded = trashed.clone();
        self.update(move |s| {
            s.trash = loaded;
            s.clear_error(Operation::ListTrash);
        });
        Ok(trashed)
    }

    #[instrument(level = "debug", skip(self, confirm))]
    pub async fn restore_note(
        &self,
        note_id: NoteId,
        notebook_id: NotebookId,
        confirm: &dyn Confirm,
    ) -> Result<(), DomainError> {
        let request = ConfirmRequest::Restore {
            note_title: self.trashed_title(note_id),
            notebook_title: self.notebook_title(notebook_id),
        };
        if !confirm.confirm(&request).await {
            debug!(note_id = %note_id, "Restore declined");
            return Err(DomainError::Declined);
        }

        self.repository()
            .restore_note(note_id)
            .await
            .map_err(|e| self.fail(Operation::RestoreNote, e))?;
        info!(note_id = %note_id, notebook_id = %notebook_id, "Restored note");
        self.update(|s| s.clear_error(Operation::RestoreNote));

        if let Err(e) = self.list_trash().await {
            warn!(error = %e, "Trash refresh failed after restore, dropping entry locally");
            self.update(|s| s.trash.retain(|n| n.id != note_id));
        }
        // the restore is persisted; a failed refresh leaves the list stale
        if self.snapshot().selected_notebook == Some(notebook_id) {
            match self
                .select_notebook(notebook_id, NoteSelection::Preserve)
                .await
            {
                Ok(FetchOutcome::Applied) => {}
                Ok(FetchOutcome::Superseded) => {
                    debug!(notebook_id = %notebook_id, "Refresh after restore superseded")
                }
                Err(e) => warn!(error = %e, "Note refresh failed after restore"),
            }
        }
        Ok(())
    }

    /// Irreversibly delete a trashed note. Only the trash list is touched.
    #[instrument(level = "debug", skip(self, confirm))]
    pub async fn permanently_delete_note(
        &self,
        note_id: NoteId,
        confirm: &dyn Confirm,
    ) -> Result<(), DomainError> {
        let request = ConfirmRequest::PermanentDelete {
            note_title: self.trashed_title(note_id),
        };
        if !confirm.confirm(&request).await {
            debug!(note_id = %note_id, "Permanent delete declined");
            return Err(DomainError::Declined);
        }

        self.repository()
            .permanently_delete_note(note_id)
            .await
            .map_err(|e| self.fail(Operation::PurgeNote, e))?;
        info!(note_id = %note_id, "Permanently deleted note");

        self.update(|s| {
            s.trash.retain(|n| n.id != note_id);
            s.clear_error(Operation::PurgeNote);
        });
        Ok(())
    }

    /// Permanently delete every note in the loaded trash list.
    ///
    /// A failing item does not stop the rest; the trash afterwards holds
    /// exactly the items that could not be deleted.
    #[instrument(level = "debug", skip(self, confirm))]
    pub async fn empty_trash(&self, confirm: &dyn Confirm) -> Result<EmptyTrashReport, DomainError> {
        let targets: Vec<NoteId> = self.snapshot().trash.iter().map(|n| n.id).collect();
        if targets.is_empty() {
            return Ok(EmptyTrashReport::default());
        }

        let request = ConfirmRequest::EmptyTrash {
            count: targets.len(),
        };
        if !confirm.confirm(&request).await {
            debug!("Empty trash declined");
            return Err(DomainError::Declined);
        }

        let mut report = EmptyTrashReport::default();
        for note_id in targets {
            match self.repository().permanently_delete_note(note_id).await {
                Ok(()) => {
                    self.update(|s| s.trash.retain(|n| n.id != note_id));
                    report.purged.push(note_id);
                }
                Err(e) => {
                    warn!(note_id = %note_id, error = %e, "Failed to purge note, continuing");
                    report.failed.push((note_id, e));
                }
            }
        }

        info!(
            purged = report.purged.len(),
            failed = report.failed.len(),
            "Emptied trash"
        );
        let failed = report.failed.len();
        self.update(move |s| {
            if failed == 0 {
                s.clear_error(Operation::EmptyTrash);
            } else {
                s.last_error = Some(OperationError {
                    operation: Operation::EmptyTrash,
                    message: format!("{failed} note(s) could not be deleted"),
                });
            }
        });
        Ok(report)
    }

    fn trashed_title(&self, note_id: NoteId) -> String {
        self.snapshot()
            .trash
            .iter()
            .find(|n| n.id == note_id)
            .map(|n| n.display_title().to_string())
            .unwrap_or_else(|| format!("Note {note_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::{AlwaysConfirm, AlwaysDecline, Call, MockNoteRepository};
    use std::sync::Arc;

    async fn store_with_trash(
        trashed: &[i64],
    ) -> (Arc<MockNoteRepository>, NoteStore<MockNoteRepository>) {
        let mut builder = MockNoteRepository::builder().with_notebook(1, "Work");
        for id in trashed {
            builder = builder.with_trashed_note(*id, 1, &format!("Old {id}"));
        }
        let repo = Arc::new(builder.build());
        let store = NoteStore::new(repo.clone());
        store.load_notebooks().await.unwrap();
        store.list_trash().await.unwrap();
        (repo, store)
    }

    #[tokio::test]
    async fn given_declined_confirmation_when_restoring_then_no_remote_call() {
        let (repo, store) = store_with_trash(&[7]).await;
        let before = repo.calls().len();

        let result = store.restore_note(NoteId(7), NotebookId(1), &AlwaysDecline).await;

        assert_eq!(result.unwrap_err(), DomainError::Declined);
        assert_eq!(repo.calls().len(), before);
        assert_eq!(store.snapshot().trash_count(), 1);
    }

    #[tokio::test]
    async fn given_restore_when_confirmed_then_prompt_names_destination_notebook() {
        let (_repo, store) = store_with_trash(&[7]).await;
        let confirm = AlwaysConfirm::default();

        store
            .restore_note(NoteId(7), NotebookId(1), &confirm)
            .await
            .unwrap();

        let asked = confirm.requests();
        assert_eq!(
            asked[0],
            ConfirmRequest::Restore {
                note_title: "Old 7".to_string(),
                notebook_title: "Work".to_string(),
            }
        );
        assert_eq!(store.snapshot().trash_count(), 0);
    }

    #[tokio::test]
    async fn given_declined_confirmation_when_emptying_trash_then_nothing_is_deleted() {
        let (repo, store) = store_with_trash(&[7, 8]).await;
        let before = repo.calls().len();

        let result = store.empty_trash(&AlwaysDecline).await;

        assert_eq!(result.unwrap_err(), DomainError::Declined);
        assert_eq!(repo.calls().len(), before);
        assert_eq!(store.snapshot().trash_count(), 2);
        assert!(repo.stored_note(NoteId(7)).is_some());
        assert!(repo.stored_note(NoteId(8)).is_some());
    }

    #[tokio::test]
    async fn given_other_notebook_active_when_restoring_then_active_list_is_not_refetched() {
        let repo = Arc::new(
            MockNoteRepository::builder()
                .with_notebook(1, "Work")
                .with_notebook(2, "Home")
                .with_note(20, 2, "Groceries")
                .with_trashed_note(7, 1, "Old 7")
                .build(),
        );
        let store = NoteStore::new(repo.clone());
        store.load_notebooks().await.unwrap();
        store
            .select_notebook(NotebookId(2), NoteSelection::Clear)
            .await
            .unwrap();
        store.list_trash().await.unwrap();
        let before = repo.calls().len();

        store
            .restore_note(NoteId(7), NotebookId(1), &AlwaysConfirm::default())
            .await
            .unwrap();

        let after = repo.calls();
        assert!(!after[before..]
            .iter()
            .any(|c| matches!(c, Call::GetNotes(_))));
        let state = store.snapshot();
        assert_eq!(state.selected_notebook, Some(NotebookId(2)));
        let visible: Vec<NoteId> = state.notes.iter().map(|n| n.id).collect();
        assert_eq!(visible, vec![NoteId(20)]);
        assert_eq!(state.trash_count(), 0);
    }

    #[tokio::test]
    async fn given_active_notebook_when_restoring_then_note_reappears_in_list() {
        let (_repo, store) = store_with_trash(&[7]).await;
        store
            .select_notebook(NotebookId(1), NoteSelection::Clear)
            .await
            .unwrap();

        store
            .restore_note(NoteId(7), NotebookId(1), &AlwaysConfirm::default())
            .await
            .unwrap();

        assert!(store.snapshot().note(NoteId(7)).is_some());
    }

    #[tokio::test]
    async fn given_failing_refresh_when_restoring_into_active_notebook_then_still_succeeds() {
        let (repo, store) = store_with_trash(&[7]).await;
        store
            .select_notebook(NotebookId(1), NoteSelection::Clear)
            .await
            .unwrap();
        repo.fail_on(Call::GetNotes(NotebookId(1)));

        let result = store
            .restore_note(NoteId(7), NotebookId(1), &AlwaysConfirm::default())
            .await;

        assert!(result.is_ok());
        assert_eq!(repo.stored_note(NoteId(7)).map(|n| n.deleted), Some(false));
        let state = store.snapshot();
        assert_eq!(state.trash_count(), 0);
        assert_eq!(
            state.last_error.as_ref().map(|e| e.operation),
            Some(Operation::SelectNotebook)
        );
    }

    #[tokio::test]
    async fn given_one_failing_item_when_emptying_trash_then_purges_the_rest() {
        let (repo, store) = store_with_trash(&[7, 8, 9]).await;
        repo.fail_on(Call::PermanentlyDeleteNote(NoteId(8)));

        let report = store.empty_trash(&AlwaysConfirm::default()).await.unwrap();

        assert_eq!(report.purged, vec![NoteId(7), NoteId(9)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, NoteId(8));
        let state = store.snapshot();
        let remaining: Vec<NoteId> = state.trash.iter().map(|n| n.id).collect();
        assert_eq!(remaining, vec![NoteId(8)]);
        assert_eq!(
            state.last_error.as_ref().map(|e| e.operation),
            Some(Operation::EmptyTrash)
        );
    }

    #[tokio::test]
    async fn given_empty_trash_when_emptying_then_does_not_ask() {
        let (_repo, store) = store_with_trash(&[]).await;
        let confirm = AlwaysConfirm::default();

        let report = store.empty_trash(&confirm).await.unwrap();

        assert!(report.is_complete());
        assert!(confirm.requests().is_empty());
    }

    #[tokio::test]
    async fn given_permanent_delete_when_confirmed_then_removes_from_trash_only() {
        let (repo, store) = store_with_trash(&[7, 8]).await;

        store
            .permanently_delete_note(NoteId(7), &AlwaysConfirm::default())
            .await
            .unwrap();

        assert_eq!(store.snapshot().trash_count(), 1);
        assert!(repo.calls().contains(&Call::PermanentlyDeleteNote(NoteId(7))));
    }

    #[test]
    fn given_unknown_notebook_when_looking_up_title_then_falls_back() {
        let store = NoteStore::new(Arc::new(MockNoteRepository::builder().build()));

        assert_eq!(store.notebook_title(NotebookId(42)), "Unknown Notebook");
    }
}
