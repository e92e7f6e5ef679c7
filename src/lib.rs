// src/lib.rs
pub mod application;
pub mod cli;
pub mod constants;
pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod util;

use anyhow::{bail, Context, Result};
use application::image_cache::{mime_from_filename, ImageCache};
use application::{NoteSelection, Session, SortDirection};
use cli::args::{Args, Command, SortField};
use cli::prompt::TerminalConfirm;
use domain::{DomainError, Image, Note, NoteId, NotebookId};
use infrastructure::{Config, PreviewRenderer, SqliteRepository};
use ports::HtmlPresenter;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use util::text::excerpt;

const EXCERPT_CHARS: usize = 60;

type AppSession = Session<SqliteRepository>;

pub async fn run(args: Args) -> Result<()> {
    debug!(?args, "Starting notesync with arguments");

    // Initialize infrastructure
    let config = Config::resolve(args.config.as_deref())?;
    let database = match args.database {
        Some(path) => {
            debug!(?path, "Using provided database path");
            path
        }
        None => config.database_path()?,
    };
    let repository = Arc::new(SqliteRepository::open(&database)?);

    // Initialize application
    let session = Session::new(repository.clone(), config.editor_options());
    session.start().await?;
    let confirm = TerminalConfirm::new(args.yes);

    let result = execute(&session, &repository, &confirm, args.command).await;
    session.shutdown(None).await;
    result
}

async fn execute(
    session: &AppSession,
    repository: &Arc<SqliteRepository>,
    confirm: &TerminalConfirm,
    command: Command,
) -> Result<()> {
    let store = session.store();
    match command {
        Command::Notebooks => {
            for notebook in &store.snapshot().notebooks {
                println!("{}\t{}", notebook.id, notebook.title);
            }
        }
        Command::NewNotebook { title } => {
            let notebook = store.create_notebook(&title).await?;
            println!("Created notebook {} ({})", notebook.id, notebook.title);
        }
        Command::DeleteNotebook { notebook_id } => {
            let notebook_id = require_notebook(session, notebook_id)?;
            store.delete_notebook(notebook_id).await?;
            println!("Deleted notebook {notebook_id}");
        }
        Command::List {
            notebook_id,
            search,
            sort,
            desc,
        } => list_notes(session, notebook_id, search.as_deref(), sort, desc).await?,
        Command::NewNote { notebook_id, title } => {
            open_notebook(session, notebook_id).await?;
            let note = match title {
                Some(title) => store.add_note(&title).await?,
                None => store.create_blank_note().await?,
            };
            println!("Created note {} ({})", note.id, note.display_title());
        }
        Command::Edit {
            note_id,
            title,
            content,
            content_file,
        } => {
            let content = match (content, content_file) {
                (Some(content), _) => Some(content),
                (None, Some(path)) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                (None, None) => None,
            };
            edit_note(session, repository, NoteId(note_id), title, content).await?;
        }
        Command::Move {
            note_id,
            notebook_id,
        } => {
            let target = require_notebook(session, notebook_id)?;
            let note = open_note_notebook(session, repository, NoteId(note_id)).await?;
            store.move_note(note.id, target).await?;
            println!(
                "Moved note {} to {}",
                note.id,
                store.notebook_title(target)
            );
        }
        Command::Delete { note_id } => {
            let note = open_note_notebook(session, repository, NoteId(note_id)).await?;
            store.soft_delete_note(note.id).await?;
            println!("Moved note {} to trash", note.id);
        }
        Command::Trash => {
            let trash = store.list_trash().await?;
            println!("Trash ({} notes)", trash.len());
            for note in &trash {
                println!(
                    "{}\t{}\t{}",
                    note.id,
                    note.display_title(),
                    store.notebook_title(note.notebook_id)
                );
            }
        }
        Command::Restore { note_id } => {
            let note = require_trashed(session, NoteId(note_id)).await?;
            store
                .restore_note(note.id, note.notebook_id, confirm)
                .await?;
            println!("Restored note {}", note.id);
        }
        Command::Purge { note_id } => {
            let note = require_trashed(session, NoteId(note_id)).await?;
            store.permanently_delete_note(note.id, confirm).await?;
            println!("Permanently deleted note {}", note.id);
        }
        Command::EmptyTrash => {
            store.list_trash().await?;
            let report = store.empty_trash(confirm).await?;
            println!("Deleted {} note(s)", report.purged.len());
            if !report.is_complete() {
                for (note_id, error) in &report.failed {
                    eprintln!("Failed to delete note {note_id}: {error}");
                }
                bail!("{} note(s) could not be deleted", report.failed.len());
            }
        }
        Command::Attach { note_id, path, at } => {
            attach_image(session, repository, NoteId(note_id), &path, at).await?
        }
        Command::View { note_id, json } => {
            view_note(session, repository, NoteId(note_id), json).await?
        }
    }
    Ok(())
}

fn require_notebook(session: &AppSession, notebook_id: i64) -> Result<NotebookId> {
    let notebook_id = NotebookId(notebook_id);
    if session.store().snapshot().notebook(notebook_id).is_none() {
        return Err(DomainError::NotebookNotFound(notebook_id).into());
    }
    Ok(notebook_id)
}

async fn open_notebook(session: &AppSession, notebook_id: i64) -> Result<NotebookId> {
    let notebook_id = require_notebook(session, notebook_id)?;
    session
        .store()
        .select_notebook(notebook_id, NoteSelection::Clear)
        .await?;
    Ok(notebook_id)
}

async fn find_note(repository: &SqliteRepository, note_id: NoteId) -> Result<Note> {
    repository
        .find_note(note_id)
        .await?
        .ok_or_else(|| DomainError::NoteNotFound(note_id).into())
}

/// Make the notebook holding `note_id` active. Trashed notes are rejected.
async fn open_note_notebook(
    session: &AppSession,
    repository: &SqliteRepository,
    note_id: NoteId,
) -> Result<Note> {
    let note = find_note(repository, note_id).await?;
    if note.deleted {
        bail!("Note {note_id} is in the trash");
    }
    session
        .store()
        .select_notebook(note.notebook_id, NoteSelection::Clear)
        .await?;
    Ok(note)
}

async fn require_trashed(session: &AppSession, note_id: NoteId) -> Result<Note> {
    let trash = session.store().list_trash().await?;
    trash
        .into_iter()
        .find(|n| n.id == note_id)
        .with_context(|| format!("Note {note_id} is not in the trash"))
}

async fn list_notes(
    session: &AppSession,
    notebook_id: i64,
    search: Option<&str>,
    sort: Option<SortField>,
    desc: bool,
) -> Result<()> {
    let store = session.store();
    open_notebook(session, notebook_id).await?;
    if let Some(query) = search {
        store.search_notes(query);
    }
    if let Some(field) = sort {
        let applied = store.sort_notes(field.into());
        if desc && applied == SortDirection::Ascending {
            store.sort_notes(field.into());
        }
    }

    let state = store.snapshot();
    for note in &state.notes {
        println!(
            "{}\t{}\t{}\t{}",
            note.id,
            note.display_title(),
            note.updated_at.format("%Y-%m-%d %H:%M"),
            excerpt(&note.content, EXCERPT_CHARS)
        );
    }
    Ok(())
}

async fn edit_note(
    session: &AppSession,
    repository: &SqliteRepository,
    note_id: NoteId,
    title: Option<String>,
    content: Option<String>,
) -> Result<()> {
    if title.is_none() && content.is_none() {
        bail!("Nothing to change: pass --title, --content or --content-file");
    }
    open_note_notebook(session, repository, note_id).await?;

    let mut editor = session.editor();
    editor.open(note_id).await?;
    if let Some(title) = title {
        editor.set_title(title);
    }
    if let Some(content) = content {
        editor.set_content(content);
    }
    let written = editor.scheduler().flush(note_id).await?;
    editor.close().await;

    info!(note_id = %note_id, written, "Edited note");
    println!("Updated note {note_id}");
    Ok(())
}

async fn attach_image(
    session: &AppSession,
    repository: &SqliteRepository,
    note_id: NoteId,
    path: &Path,
    at: Option<usize>,
) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("Image path has no file name")?;
    let mime_type = mime_from_filename(filename)
        .with_context(|| format!("Unsupported file type: {filename}"))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    open_note_notebook(session, repository, note_id).await?;
    let mut editor = session.editor();
    editor.open(note_id).await?;
    let image_id = editor.insert_image(&bytes, filename, mime_type, at).await?;
    editor.scheduler().flush(note_id).await?;
    editor.close().await;

    println!("Attached image://{image_id} to note {note_id}");
    Ok(())
}

#[derive(Serialize)]
struct NoteView<'a> {
    #[serde(flatten)]
    note: &'a Note,
    notebook: String,
    images: Vec<Image>,
}

async fn view_note(
    session: &AppSession,
    repository: &Arc<SqliteRepository>,
    note_id: NoteId,
    json: bool,
) -> Result<()> {
    let note = find_note(repository, note_id).await?;
    let notebook = session.store().notebook_title(note.notebook_id);
    debug!(?note, "Retrieved note");

    if json {
        let view = NoteView {
            note: &note,
            notebook,
            images: repository.list_images(note_id).await?,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let images = ImageCache::new(repository.clone(), session.options().max_image_bytes);
    let resolved = images.resolve_all(&note.content).await;
    debug!(resolved, "Resolved images for preview");

    let html = HtmlPresenter::new().render(&note, &notebook, &images);
    let mut renderer = PreviewRenderer::new();
    let page = renderer.write_page(&format!("note-{note_id}"), &html)?;
    info!(note_id = %note_id, path = %page.display(), "Opening note preview");
    renderer.open_in_browser(&page).await?;

    images.release();
    Ok(())
}

#[cfg(test)]
/// must be public to be used from integration tests
mod tests {
    use crate::util::testing;
    #[ctor::ctor]
    fn init() {
        testing::init_test_setup().expect("Failed to initialize test setup");
    }
}
