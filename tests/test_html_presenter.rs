mod helpers;

use anyhow::Result;
use helpers::{TestDatabase, PNG};
use notesync::application::image_cache::placeholder_data_uri;
use notesync::application::{
    ImageCache, ImageLookup, NavigationPolicy, NoteRepository, NoteSelection,
};
use notesync::domain::{ImageId, NoteId};
use notesync::ports::HtmlPresenter;
use notesync::util::testing::{Call, MockNoteRepository};
use std::sync::Arc;

#[tokio::test]
async fn given_image_embedded_before_upload_when_rendering_then_placeholder_until_stored(
) -> Result<()> {
    // Arrange
    let repo = Arc::new(
        MockNoteRepository::builder()
            .with_notebook(1, "Work")
            .with_note(10, 1, "Shots")
            .build(),
    );
    let cache = ImageCache::new(repo.clone(), 1024);
    let presenter = HtmlPresenter::new();
    let id = ImageId::from_content(PNG);
    let content = format!("![shot](image://{id})");

    // Act: render before the image exists
    let before = presenter.render_body(&content, &cache);

    // Assert
    assert!(before.contains(&placeholder_data_uri()));
    assert!(before.contains(&format!(r#"data-image-id="{id}""#)));

    // Act: upload, then render again
    let stored = cache.store(NoteId(10), PNG, "shot.png", "image/png").await?;
    let after = presenter.render_body(&content, &cache);

    // Assert
    assert_eq!(stored, id);
    assert!(!after.contains("image-placeholder"));
    let handle = cache.lookup(&id).expect("image is cached");
    assert!(after.contains(&handle.url()));
    assert!(!repo.calls().iter().any(|c| matches!(c, Call::GetImage(_))));
    Ok(())
}

#[tokio::test]
async fn given_unresolved_images_when_resolving_then_revision_signals_rerender() -> Result<()> {
    // Arrange
    let repo = Arc::new(MockNoteRepository::builder().with_image(PNG).build());
    let cache = ImageCache::new(repo.clone(), 1024);
    let id = ImageId::from_content(PNG);
    let content = format!("![a](image://{id}) and again ![b](image://{id})");
    let mut revisions = cache.subscribe();

    // Act
    let resolved = cache.resolve_all(&content).await;

    // Assert
    assert_eq!(resolved, 1);
    assert!(revisions.has_changed()?);
    let html = HtmlPresenter::new().render_body(&content, &cache);
    assert_eq!(html.matches("file://").count(), 2);
    let fetches = repo
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::GetImage(_)))
        .count();
    assert_eq!(fetches, 1);
    Ok(())
}

#[tokio::test]
async fn given_attached_image_when_previewing_in_editor_then_uses_local_file() -> Result<()> {
    // Arrange
    let db = TestDatabase::new()?;
    let session = db.session(NavigationPolicy::Flush);
    let store = session.store();
    let work = store.create_notebook("Work").await?;
    store.select_notebook(work.id, NoteSelection::Clear).await?;
    let note = store.add_note("Diagram").await?;
    let mut editor = session.editor();
    editor.open(note.id).await?;
    editor.set_content("Before\n\n");

    // Act
    let id = editor.insert_image(PNG, "dag.png", "image/png", None).await?;
    let html = editor.preview_html();

    // Assert
    let handle = editor.images().lookup(&id).expect("image is cached");
    assert!(handle.path.exists());
    assert!(html.contains(&handle.url()));
    assert!(editor.content().ends_with(&format!("![dag.png](image://{id})")));
    editor.close().await;
    assert_eq!(db.repository.get_image(&id).await?, PNG.to_vec());
    let stored = db.repository.find_note(note.id).await?.expect("note exists");
    assert!(stored.content.contains(&format!("image://{id}")));
    Ok(())
}
