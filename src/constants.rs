// src/constants.rs
//
// Application-wide constants. Each one names where it is consumed.

/// Quiet period before a debounced field edit is written back.
///
/// Every new edit to the same (note, field) pair restarts the window.
///
/// Used in: `application/scheduler.rs`, `infrastructure/config.rs`
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;

/// Largest image payload accepted for upload (2 MiB).
///
/// Checked on the client before the remote call is issued.
///
/// Used in: `application/image_cache.rs`, `infrastructure/config.rs`
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// URI scheme used to embed stored images in markdown content.
///
/// Used in: `application/image_cache.rs`, `ports/html.rs`
pub const IMAGE_SCHEME: &str = "image://";

/// Label used when a trashed note points at a notebook that is no longer loaded.
///
/// Used in: `application/trash.rs`
pub const UNKNOWN_NOTEBOOK: &str = "Unknown Notebook";

/// Delay in milliseconds after writing the HTML preview before opening the browser.
///
/// Used in: `infrastructure/renderer.rs`
pub const BROWSER_LAUNCH_DELAY_MS: u64 = 500;
