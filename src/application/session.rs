// src/application/session.rs
use crate::application::{EditorOptions, NoteEditor, NoteRepository, NoteStore};
use crate::domain::DomainError;
use std::sync::Arc;
use tracing::{info, instrument};

/// One client session: the store plus the settings editors are built with.
///
/// Constructed once at startup and passed to whoever needs it; there is no
/// global instance.
pub struct Session<R: NoteRepository + 'static> {
    store: Arc<NoteStore<R>>,
    options: EditorOptions,
}

impl<R: NoteRepository + 'static> Session<R> {
    pub fn new(repository: Arc<R>, options: EditorOptions) -> Self {
        Self {
            store: Arc::new(NoteStore::new(repository)),
            options,
        }
    }

    pub fn store(&self) -> &Arc<NoteStore<R>> {
        &self.store
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Load the notebook list.
    #[instrument(level = "debug", skip(self))]
    pub async fn start(&self) -> Result<(), DomainError> {
        let notebooks = self.store.load_notebooks().await?;
        info!(notebooks = notebooks.len(), "Session started");
        Ok(())
    }

    pub fn editor(&self) -> NoteEditor<R> {
        NoteEditor::new(self.store.clone(), self.options.clone())
    }

    /// Close the editor (if any) and clear all in-memory state.
    pub async fn shutdown(self, editor: Option<NoteEditor<R>>) {
        if let Some(editor) = editor {
            editor.close().await;
        }
        self.store.teardown();
        info!("Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{NavigationPolicy, NoteSelection};
    use crate::domain::{NoteId, NotebookId};
    use crate::util::testing::MockNoteRepository;
    use std::time::Duration;

    fn options() -> EditorOptions {
        EditorOptions {
            quiet_period: Duration::from_millis(1000),
            navigation: NavigationPolicy::Flush,
            max_image_bytes: 1024,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn given_pending_edit_when_shutting_down_then_flushes_and_clears_state() {
        let repo = Arc::new(
            MockNoteRepository::builder()
                .with_notebook(1, "Work")
                .with_note(10, 1, "Draft")
                .build(),
        );
        let session = Session::new(repo.clone(), options());
        session.start().await.unwrap();
        session
            .store()
            .select_notebook(NotebookId(1), NoteSelection::Clear)
            .await
            .unwrap();
        let mut editor = session.editor();
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("last words");
        let store = session.store().clone();

        session.shutdown(Some(editor)).await;

        assert_eq!(repo.note_content(NoteId(10)).as_deref(), Some("last words"));
        let state = store.snapshot();
        assert!(state.notebooks.is_empty());
        assert_eq!(state.selected_notebook, None);
    }
}
