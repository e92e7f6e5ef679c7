use anyhow::{Context, Result};
use notesync::application::{EditorOptions, NavigationPolicy, Session};
use notesync::infrastructure::SqliteRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Quiet period short enough for real-time tests
#[allow(dead_code)]
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Fresh SQLite database in a temporary directory
#[allow(dead_code)]
pub struct TestDatabase {
    _temp_dir: TempDir,
    pub path: PathBuf,
    pub repository: Arc<SqliteRepository>,
}

impl TestDatabase {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let path = temp_dir.path().join("notes.db");
        let repository = Arc::new(SqliteRepository::open(&path)?);
        Ok(Self {
            _temp_dir: temp_dir,
            path,
            repository,
        })
    }

    #[allow(dead_code)]
    pub fn session(&self, navigation: NavigationPolicy) -> Session<SqliteRepository> {
        Session::new(self.repository.clone(), options(navigation))
    }
}

#[allow(dead_code)]
pub fn options(navigation: NavigationPolicy) -> EditorOptions {
    EditorOptions {
        quiet_period: QUIET_PERIOD,
        navigation,
        max_image_bytes: 2 * 1024 * 1024,
    }
}

/// Smallest byte sequence recognised as a PNG
#[allow(dead_code)]
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
