//! Image lifecycle manager.
//!
//! Uploads are validated (allow-listed type, size cap) before anything is
//! written, then persisted under a server-generated filename; the
//! client-supplied name is never used as a storage key. Deletions are
//! best-effort cleanup: a failure to remove a file is logged but never
//! fails the request that triggered it. The shared placeholder image is
//! never deleted.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Upload size cap, applied before any filesystem write.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Client-supplied extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Shared default image referenced by posts without a custom image.
/// Deployment places this file in the blog upload directory; the store
/// refuses to delete it.
pub const PLACEHOLDER_FILENAME: &str = "placeholder.webp";

/// Which upload directory a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Blog,
    Gallery,
}

impl ImageKind {
    pub fn dir(self) -> &'static str {
        match self {
            ImageKind::Blog => "blog",
            ImageKind::Gallery => "gallery",
        }
    }

    fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "blog" => Some(ImageKind::Blog),
            "gallery" => Some(ImageKind::Gallery),
            _ => None,
        }
    }
}

/// Outcome of the validate-then-store pipeline.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file too large (limit {limit} bytes)")]
    TooLarge { limit: usize },
    #[error("unsupported media type; allowed: JPEG, PNG, GIF, WebP")]
    UnsupportedType,
    #[error("empty upload")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A successfully stored file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub filename: String,
    pub url: String,
    pub size: usize,
    pub mime_type: String,
}

/// Filesystem-backed image store rooted at the configured upload directory.
/// Cheap to clone; shared process-wide through `AppState`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Reject path traversal and other storage-key abuse in filenames that
/// arrive from outside (delete requests, URLs read back from records).
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

/// True if the name or URL refers to the shared placeholder image.
pub fn is_placeholder(name_or_url: &str) -> bool {
    name_or_url.rsplit('/').next() == Some(PLACEHOLDER_FILENAME)
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: ImageKind) -> PathBuf {
        self.root.join(kind.dir())
    }

    /// Public URL under which a stored file is served.
    pub fn public_url(kind: ImageKind, filename: &str) -> String {
        format!("/uploads/{}/{}", kind.dir(), filename)
    }

    /// Validate and persist an uploaded file. All validation happens
    /// before the write; a rejected upload leaves no file behind.
    pub async fn save(
        &self,
        kind: ImageKind,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredImage, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_FILE_SIZE {
            return Err(UploadError::TooLarge {
                limit: MAX_FILE_SIZE,
            });
        }

        let original_ext = original_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
            return Err(UploadError::UnsupportedType);
        }

        // Content must match an allowed type regardless of the claimed
        // extension.
        let mime_type = detect_image_mime(bytes).ok_or(UploadError::UnsupportedType)?;

        let dir = self.dir(kind);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension_for_mime(mime_type));
        tokio::fs::write(dir.join(&filename), bytes).await?;

        tracing::info!(
            "Image stored: {}/{} ({} bytes)",
            kind.dir(),
            filename,
            bytes.len()
        );

        Ok(StoredImage {
            url: Self::public_url(kind, &filename),
            filename,
            size: bytes.len(),
            mime_type: mime_type.to_string(),
        })
    }

    /// Best-effort file removal. Placeholder and unsafe names are skipped;
    /// filesystem errors are logged and swallowed so cleanup never fails
    /// the primary operation.
    pub async fn remove(&self, kind: ImageKind, filename: &str) {
        if is_placeholder(filename) {
            tracing::debug!("Skipping delete of shared placeholder image");
            return;
        }
        if !is_safe_filename(filename) {
            tracing::warn!("Refusing to delete unsafe filename: {:?}", filename);
            return;
        }

        let path = self.dir(kind).join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("Image deleted: {}/{}", kind.dir(), filename),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Image already absent: {}/{}", kind.dir(), filename);
            }
            Err(e) => {
                tracing::error!("Failed to delete image {}/{}: {}", kind.dir(), filename, e);
            }
        }
    }

    /// Best-effort removal keyed by a stored public URL
    /// (`/uploads/<dir>/<filename>`). Unknown URL shapes are ignored.
    pub async fn remove_by_url(&self, url: &str) {
        let Some(rest) = url.strip_prefix("/uploads/") else {
            tracing::debug!("Not a managed upload URL, skipping delete: {}", url);
            return;
        };
        let Some((dir, filename)) = rest.split_once('/') else {
            return;
        };
        let Some(kind) = ImageKind::from_dir(dir) else {
            tracing::warn!("Unknown upload directory in URL: {}", url);
            return;
        };
        self.remove(kind, filename).await;
    }
}
