// src/application/image_cache.rs
use crate::application::NoteRepository;
use crate::constants::IMAGE_SCHEME;
use crate::domain::{ImageError, ImageId, NoteId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::{Builder, TempDir};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, instrument, warn};

lazy_static! {
    // image://<id> references inside markdown or rendered html
    static ref IMAGE_REF_REGEX: Regex = Regex::new(r"image://([A-Za-z0-9._-]+)")
        .expect("Failed to compile image reference regex");
}

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="160" height="120" viewBox="0 0 160 120"><rect width="160" height="120" rx="6" fill="#e9ecef"/><path d="M40 88l26-30 18 20 12-12 24 22z" fill="#adb5bd"/><circle cx="108" cy="42" r="10" fill="#adb5bd"/></svg>"##;

/// Inline graphic shown for an image that is not resolved yet. Always the same value.
pub fn placeholder_data_uri() -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(PLACEHOLDER_SVG))
}

/// Markdown snippet embedding a stored image.
pub fn markdown_reference(id: &ImageId, alt: &str) -> String {
    format!("![{alt}]({IMAGE_SCHEME}{id})")
}

/// Distinct image ids referenced in `content`, in order of first appearance.
pub fn scan(content: &str) -> Vec<ImageId> {
    let mut seen = HashSet::new();
    IMAGE_REF_REGEX
        .captures_iter(content)
        .filter_map(|cap| cap.get(1))
        .map(|m| ImageId::new(m.as_str()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Reject payloads that are not images or exceed `max_bytes`.
pub fn validate_upload(len: usize, mime_type: &str, max_bytes: usize) -> Result<(), ImageError> {
    if !mime_type.starts_with("image/") {
        return Err(ImageError::UnsupportedType(mime_type.to_string()));
    }
    if len > max_bytes {
        return Err(ImageError::TooLarge {
            size: len,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Locally addressable copy of an image, valid until the cache is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: ImageId,
    pub path: PathBuf,
}

impl ImageHandle {
    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Read access to resolved images, used by the presenter.
pub trait ImageLookup {
    fn lookup(&self, id: &ImageId) -> Option<Arc<ImageHandle>>;
}

type Slot = Arc<OnceCell<Arc<ImageHandle>>>;

/// Resolves `image://<id>` references to local files, once per id.
///
/// Handles live in a temporary directory owned by the cache and are
/// released together when the editor goes away. There is no size-based
/// eviction.
pub struct ImageCache<R: NoteRepository> {
    repository: Arc<R>,
    max_bytes: usize,
    slots: Mutex<HashMap<ImageId, Slot>>,
    dir: Mutex<Option<Arc<TempDir>>>,
    revision: watch::Sender<u64>,
}

impl<R: NoteRepository> ImageCache<R> {
    pub fn new(repository: Arc<R>, max_bytes: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            repository,
            max_bytes,
            slots: Mutex::new(HashMap::new()),
            dir: Mutex::new(None),
            revision,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ImageId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: &ImageId) -> Slot {
        self.slots().entry(id.clone()).or_default().clone()
    }

    /// Bumped whenever a handle is added or the cache is released; renderers
    /// re-render on change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle for `id`, fetching it on first use. Concurrent callers for the
    /// same id share one fetch.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, id: &ImageId) -> Result<Arc<ImageHandle>, ImageError> {
        let slot = self.slot(id);
        if let Some(cached) = slot.get() {
            return Ok(cached.clone());
        }
        let handle = slot
            .get_or_try_init(|| async {
                debug!(image_id = %id, "Fetching image");
                let bytes = self.repository.get_image(id).await?;
                let handle = self.materialize(id, &bytes, None).await?;
                Ok::<_, ImageError>(Arc::new(handle))
            })
            .await?
            .clone();
        self.bump();
        Ok(handle)
    }

    /// Resolve every distinct reference in `content` that is not cached yet.
    /// Returns how many new handles were created; failures stay placeholders.
    pub async fn resolve_all(&self, content: &str) -> usize {
        let missing: Vec<ImageId> = scan(content)
            .into_iter()
            .filter(|id| self.lookup(id).is_none())
            .collect();
        if missing.is_empty() {
            return 0;
        }

        let results = join_all(missing.iter().map(|id| self.resolve(id))).await;
        let mut resolved = 0;
        for (id, result) in missing.iter().zip(results) {
            match result {
                Ok(_) => resolved += 1,
                Err(e) => warn!(image_id = %id, error = %e, "Image unresolved, keeping placeholder"),
            }
        }
        resolved
    }

    /// Upload an image for `note_id` and seed the cache with its bytes.
    ///
    /// Returns the id to embed as `image://<id>`.
    #[instrument(level = "debug", skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store(
        &self,
        note_id: NoteId,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<ImageId, ImageError> {
        validate_upload(bytes.len(), mime_type, self.max_bytes)?;

        let id = self
            .repository
            .save_image(note_id, bytes, filename, mime_type)
            .await?;
        info!(image_id = %id, note_id = %note_id, "Stored image");

        let handle = Arc::new(self.materialize(&id, bytes, Some(mime_type)).await?);
        if self.slot(&id).set(handle).is_err() {
            debug!(image_id = %id, "Image already cached");
        }
        self.bump();
        Ok(id)
    }

    /// Drop every handle and delete the backing files.
    pub fn release(&self) {
        let released = {
            let mut slots = self.slots();
            let count = slots.len();
            slots.clear();
            count
        };
        let dir = self
            .dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(dir);
        debug!(released, "Released image handles");
        self.bump();
    }

    fn handle_dir(&self) -> Result<Arc<TempDir>, std::io::Error> {
        let mut dir = self.dir.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = dir.as_ref() {
            return Ok(existing.clone());
        }
        let created = Arc::new(
            Builder::new()
                .prefix("notesync-images-")
                .rand_bytes(5)
                .tempdir()?,
        );
        *dir = Some(created.clone());
        Ok(created)
    }

    async fn materialize(
        &self,
        id: &ImageId,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<ImageHandle, ImageError> {
        let io_error = |e: std::io::Error| ImageError::Io {
            id: id.clone(),
            message: e.to_string(),
        };
        // the Arc keeps the directory alive while the write is in flight
        let dir = self.handle_dir().map_err(io_error)?;
        let extension = mime_type
            .and_then(extension_for_mime)
            .or_else(|| sniff_extension(bytes))
            .unwrap_or("bin");
        let path = file_path(dir.path(), id, extension);
        tokio::fs::write(&path, bytes).await.map_err(io_error)?;
        Ok(ImageHandle {
            id: id.clone(),
            path,
        })
    }
}

impl<R: NoteRepository> ImageLookup for ImageCache<R> {
    fn lookup(&self, id: &ImageId) -> Option<Arc<ImageHandle>> {
        self.slots().get(id).and_then(|slot| slot.get().cloned())
    }
}

/// File for `id` inside `dir`. Bytes outside `[A-Za-z0-9._-]` are written as
/// `%XX`, so distinct ids never share a file and never leave `dir`.
fn file_path(dir: &Path, id: &ImageId, extension: &str) -> PathBuf {
    let mut stem = String::with_capacity(id.as_str().len());
    for byte in id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    dir.join(format!("{stem}.{extension}"))
}

fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        _ => None,
    }
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// Guess a mime type from a file name, for callers that only have a path.
pub fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
