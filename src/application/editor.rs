// src/application/editor.rs
use crate::application::image_cache::{self, ImageCache};
use crate::application::{NoteRepository, NoteStore, WriteBackScheduler};
use crate::domain::{DomainError, ImageError, ImageId, NoteField, NoteId};
use crate::ports::HtmlPresenter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happens to unsent edits when the editor switches notes or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPolicy {
    /// Write pending edits immediately
    Flush,
    /// Drop edits still inside the quiet period
    Discard,
}

#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub quiet_period: Duration,
    pub navigation: NavigationPolicy,
    pub max_image_bytes: usize,
}

/// Editing surface bound to at most one note.
///
/// Owns the local editable title/content, the write-back timers and the
/// image handles; all of them live exactly as long as the editor.
pub struct NoteEditor<R: NoteRepository + 'static> {
    store: Arc<NoteStore<R>>,
    scheduler: WriteBackScheduler<R>,
    images: ImageCache<R>,
    navigation: NavigationPolicy,
    bound: Option<NoteId>,
    title: String,
    content: String,
}

impl<R: NoteRepository + 'static> NoteEditor<R> {
    pub fn new(store: Arc<NoteStore<R>>, options: EditorOptions) -> Self {
        let scheduler = WriteBackScheduler::new(store.clone(), options.quiet_period);
        let images = ImageCache::new(store.repository().clone(), options.max_image_bytes);
        Self {
            store,
            scheduler,
            images,
            navigation: options.navigation,
            bound: None,
            title: String::new(),
            content: String::new(),
        }
    }

    pub fn bound_note(&self) -> Option<NoteId> {
        self.bound
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn images(&self) -> &ImageCache<R> {
        &self.images
    }

    pub fn scheduler(&self) -> &WriteBackScheduler<R> {
        &self.scheduler
    }

    /// Select `note_id` in the store and load its fields into the editor.
    pub async fn open(&mut self, note_id: NoteId) -> Result<(), DomainError> {
        if self.bound == Some(note_id) {
            return Ok(());
        }
        if self.store.snapshot().note(note_id).is_none() {
            return Err(DomainError::NoteNotFound(note_id));
        }
        self.leave().await;
        self.store.select_note(note_id)?;
        self.bind(note_id);
        Ok(())
    }

    /// Rebind to whatever note the store has selected, e.g. after a list click
    /// or a delete that cleared the selection.
    pub async fn follow_selection(&mut self) {
        let selected = self.store.snapshot().selected_note;
        if selected == self.bound {
            return;
        }
        self.leave().await;
        match selected {
            Some(note_id) => self.bind(note_id),
            None => self.unbind(),
        }
    }

    fn bind(&mut self, note_id: NoteId) {
        let snapshot = self.store.snapshot();
        let (title, content) = snapshot
            .note(note_id)
            .map(|n| (n.title.clone(), n.content.clone()))
            .unwrap_or_default();
        debug!(note_id = %note_id, "Editor bound to note");
        self.bound = Some(note_id);
        self.title = title;
        self.content = content;
    }

    fn unbind(&mut self) {
        self.bound = None;
        self.title.clear();
        self.content.clear();
    }

    /// Apply the navigation policy to the current binding.
    async fn leave(&mut self) {
        let Some(previous) = self.bound else {
            return;
        };
        match self.navigation {
            NavigationPolicy::Flush => {
                if let Err(e) = self.scheduler.flush(previous).await {
                    warn!(note_id = %previous, error = %e, "Flush on navigation failed");
                }
            }
            NavigationPolicy::Discard => {
                self.scheduler.cancel(previous);
            }
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.edit(NoteField::Title, title.into());
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.edit(NoteField::Content, content.into());
    }

    fn edit(&mut self, field: NoteField, value: String) {
        let Some(note_id) = self.bound else {
            debug!(%field, "Edit ignored, no note open");
            return;
        };
        self.scheduler.schedule(note_id, field, value.clone());
        match field {
            NoteField::Title => self.title = value,
            NoteField::Content => self.content = value,
        }
    }

    /// Upload an image and embed it in the content at byte offset `at`
    /// (end of content when `None`).
    pub async fn insert_image(
        &mut self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
        at: Option<usize>,
    ) -> Result<ImageId, ImageError> {
        let note_id = self.bound.ok_or(ImageError::NoNoteOpen)?;
        let id = self.images.store(note_id, bytes, filename, mime_type).await?;

        let snippet = image_cache::markdown_reference(&id, filename);
        let mut content = self.content.clone();
        let mut offset = at.unwrap_or(content.len()).min(content.len());
        while !content.is_char_boundary(offset) {
            offset -= 1;
        }
        content.insert_str(offset, &snippet);
        self.set_content(content);
        Ok(id)
    }

    /// Fetch images referenced by the current content. Returns the number of
    /// newly resolved images.
    pub async fn resolve_images(&self) -> usize {
        self.images.resolve_all(&self.content).await
    }

    /// Preview of the current content; unresolved images render as placeholders.
    pub fn preview_html(&self) -> String {
        HtmlPresenter::new().render_body(&self.content, &self.images)
    }

    /// Tear the editor down: apply the navigation policy to pending edits and
    /// release all image handles.
    pub async fn close(mut self) {
        self.leave().await;
        self.scheduler.cancel_all();
        self.images.release();
        info!("Editor closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NoteSelection;
    use crate::domain::NotebookId;
    use crate::util::testing::{Call, MockNoteRepository};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nshot";

    async fn editor_with(
        navigation: NavigationPolicy,
    ) -> (Arc<MockNoteRepository>, NoteEditor<MockNoteRepository>) {
        let repo = Arc::new(
            MockNoteRepository::builder()
                .with_notebook(1, "Work")
                .with_note(10, 1, "A")
                .with_note(11, 1, "B")
                .with_image(PNG)
                .build(),
        );
        let store = Arc::new(NoteStore::new(repo.clone()));
        store
            .select_notebook(NotebookId(1), NoteSelection::Clear)
            .await
            .unwrap();
        let editor = NoteEditor::new(
            store,
            EditorOptions {
                quiet_period: Duration::from_millis(1000),
                navigation,
                max_image_bytes: 1024,
            },
        );
        (repo, editor)
    }

    #[tokio::test(start_paused = true)]
    async fn given_switch_before_timer_fires_when_discarding_then_new_note_is_untouched() {
        let (repo, mut editor) = editor_with(NavigationPolicy::Discard).await;
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("typed into A");

        editor.open(NoteId(11)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(editor.content(), "");
        assert_eq!(repo.note_content(NoteId(11)).as_deref(), Some(""));
        assert_eq!(repo.note_content(NoteId(10)).as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn given_switch_before_timer_fires_when_flushing_then_edit_lands_on_old_note() {
        let (repo, mut editor) = editor_with(NavigationPolicy::Flush).await;
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("typed into A");

        editor.open(NoteId(11)).await.unwrap();
        editor.set_content("typed into B");
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(repo.note_content(NoteId(10)).as_deref(), Some("typed into A"));
        assert_eq!(repo.note_content(NoteId(11)).as_deref(), Some("typed into B"));
    }

    #[tokio::test(start_paused = true)]
    async fn given_open_note_when_switching_then_loads_its_fields() {
        let (_repo, mut editor) = editor_with(NavigationPolicy::Flush).await;

        editor.open(NoteId(11)).await.unwrap();

        assert_eq!(editor.bound_note(), Some(NoteId(11)));
        assert_eq!(editor.title(), "B");
    }

    #[tokio::test(start_paused = true)]
    async fn given_pending_edit_when_note_trashed_and_discarding_then_unbinds_without_writes() {
        let (repo, mut editor) = editor_with(NavigationPolicy::Discard).await;
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("typed into A");

        editor.store.soft_delete_note(NoteId(10)).await.unwrap();
        editor.follow_selection().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(editor.bound_note(), None);
        assert_eq!(editor.content(), "");
        assert_eq!(editor.scheduler().pending_count(), 0);
        assert!(!repo
            .calls()
            .iter()
            .any(|c| matches!(c, Call::UpdateContent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn given_pending_edit_when_note_trashed_and_flushing_then_writes_only_trashed_note() {
        let (repo, mut editor) = editor_with(NavigationPolicy::Flush).await;
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("last words");

        editor.store.soft_delete_note(NoteId(10)).await.unwrap();
        editor.follow_selection().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(editor.bound_note(), None);
        let writes: Vec<Call> = repo
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UpdateContent(_)))
            .collect();
        assert_eq!(writes, vec![Call::UpdateContent(NoteId(10))]);
        assert_eq!(repo.note_content(NoteId(10)).as_deref(), Some("last words"));
        assert_eq!(repo.note_content(NoteId(11)).as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn given_store_selection_changed_when_following_then_binds_new_note() {
        let (_repo, mut editor) = editor_with(NavigationPolicy::Flush).await;
        editor.open(NoteId(10)).await.unwrap();

        editor.store.select_note(NoteId(11)).unwrap();
        editor.follow_selection().await;

        assert_eq!(editor.bound_note(), Some(NoteId(11)));
        assert_eq!(editor.title(), "B");
    }

    #[tokio::test(start_paused = true)]
    async fn given_image_reference_when_resolving_then_preview_swaps_placeholder_for_file() {
        let (_repo, mut editor) = editor_with(NavigationPolicy::Flush).await;
        let id = ImageId::from_content(PNG);
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content(format!("![shot](image://{id})"));
        assert!(editor.preview_html().contains("image-placeholder"));

        let resolved = editor.resolve_images().await;

        assert_eq!(resolved, 1);
        let html = editor.preview_html();
        assert!(!html.contains("image-placeholder"));
        assert!(html.contains("file://"));
        assert_eq!(editor.resolve_images().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn given_multibyte_content_when_inserting_image_then_snaps_to_char_boundary() {
        let (_repo, mut editor) = editor_with(NavigationPolicy::Flush).await;
        editor.open(NoteId(10)).await.unwrap();
        editor.set_content("héllo");

        let id = editor
            .insert_image(b"\x89PNG\r\n\x1a\n", "a.png", "image/png", Some(2))
            .await
            .unwrap();

        assert_eq!(editor.content(), format!("h![a.png](image://{id})éllo"));
    }

    #[tokio::test(start_paused = true)]
    async fn given_no_open_note_when_inserting_image_then_errors() {
        let (_repo, mut editor) = editor_with(NavigationPolicy::Flush).await;

        let err = editor
            .insert_image(b"x", "a.png", "image/png", None)
            .await
            .unwrap_err();

        assert_eq!(err, ImageError::NoNoteOpen);
    }
}
