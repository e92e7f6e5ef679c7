// src/cli/args.rs
use crate::application::SortKey;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
#[command(arg_required_else_help = true, disable_help_subcommand = true)]
pub struct Args {
    /// Path to the TOML config file (optional)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the notes database, overrides the config (optional)
    #[arg(short, long, value_name = "DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Created,
    Updated,
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Title => SortKey::Title,
            SortField::Created => SortKey::CreatedAt,
            SortField::Updated => SortKey::UpdatedAt,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List notebooks
    Notebooks,

    /// Create a notebook
    NewNotebook {
        #[arg(value_name = "TITLE")]
        title: String,
    },

    /// Delete a notebook together with its notes
    DeleteNotebook {
        #[arg(value_name = "NOTEBOOK_ID")]
        notebook_id: i64,
    },

    /// List the notes of a notebook
    List {
        #[arg(value_name = "NOTEBOOK_ID")]
        notebook_id: i64,

        /// Case-insensitive title filter
        #[arg(short, long)]
        search: Option<String>,

        /// Sort by field
        #[arg(long, value_enum)]
        sort: Option<SortField>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,
    },

    /// Create a note; without a title an untitled note is created
    NewNote {
        #[arg(value_name = "NOTEBOOK_ID")]
        notebook_id: i64,

        #[arg(value_name = "TITLE")]
        title: Option<String>,
    },

    /// Change the title and/or content of a note
    Edit {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        /// Read the new content from a file
        #[arg(long, value_name = "FILE")]
        content_file: Option<PathBuf>,
    },

    /// Move a note to another notebook
    Move {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,

        #[arg(value_name = "NOTEBOOK_ID")]
        notebook_id: i64,
    },

    /// Move a note to the trash
    Delete {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,
    },

    /// List trashed notes
    Trash,

    /// Restore a trashed note to its notebook
    Restore {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,
    },

    /// Permanently delete a trashed note
    Purge {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,
    },

    /// Permanently delete every trashed note
    EmptyTrash,

    /// Attach an image file to a note
    Attach {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,

        #[arg(value_name = "IMAGE")]
        path: PathBuf,

        /// Byte offset in the content to insert the reference at (default: end)
        #[arg(long)]
        at: Option<usize>,
    },

    /// View a note in the browser
    View {
        #[arg(value_name = "NOTE_ID")]
        note_id: i64,

        /// Output note as JSON instead of opening in browser
        #[arg(long)]
        json: bool,
    },
}
