// src/infrastructure/renderer.rs
use crate::constants::BROWSER_LAUNCH_DELAY_MS;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{Builder, TempDir};
use tracing::{debug, instrument};

/// Writes rendered pages to a temporary directory and opens them in the
/// system browser. Pages live as long as the renderer.
#[derive(Debug, Default)]
pub struct PreviewRenderer {
    temp_dir: Option<TempDir>,
}

impl PreviewRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn dir(&mut self) -> Result<&Path> {
        if self.temp_dir.is_none() {
            let dir = Builder::new()
                .prefix("notesync-preview-")
                .rand_bytes(5)
                .tempdir()
                .context("Failed to create temporary directory")?;
            self.temp_dir = Some(dir);
        }
        self.temp_dir
            .as_ref()
            .map(TempDir::path)
            .context("Temporary directory missing")
    }

    /// Write `html` to `<name>.html` in the preview directory.
    pub fn write_page(&mut self, name: &str, html: &str) -> Result<PathBuf> {
        let file_path = self.dir()?.join(format!("{name}.html"));

        File::create(&file_path)
            .with_context(|| format!("Failed to create temp file at {}", file_path.display()))?
            .write_all(html.as_bytes())
            .context("Failed to write content to temporary file")?;

        debug!(path = %file_path.display(), "Wrote preview page");
        Ok(file_path)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn open_in_browser(&self, path: &Path) -> Result<()> {
        let path_str = path.to_str().context("Failed to convert path to string")?;

        #[cfg(target_os = "macos")]
        {
            std::process::Command::new("open")
                .arg(path_str)
                .spawn()
                .context("Failed to open browser")?;
        }
        #[cfg(target_os = "windows")]
        {
            std::process::Command::new("cmd")
                .args(["/C", "start", path_str])
                .spawn()
                .context("Failed to open browser")?;
        }
        #[cfg(target_os = "linux")]
        {
            std::process::Command::new("xdg-open")
                .arg(path_str)
                .spawn()
                .context("Failed to open browser")?;
        }

        // the browser reads the page and image files asynchronously
        tokio::time::sleep(Duration::from_millis(BROWSER_LAUNCH_DELAY_MS)).await;
        Ok(())
    }
}
