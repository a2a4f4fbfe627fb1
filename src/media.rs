//! Uploaded files: naming, validation and the media directory.

use anyhow::{Context, Result};
use axum::body::Bytes;
use image::{ImageFormat, ImageResult};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RECIPE_UPLOAD_DIR: &str = "uploads/recipe";

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Bytes,
}

/// The uploaded file name carries an extension no image format uses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("File extension \"{0}\" is not allowed.")]
pub struct DisallowedExtension(pub String);

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url: url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of a stored file, `relative` being the path kept on the row.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), relative)
    }

    pub async fn save(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))
    }

    pub async fn remove(&self, relative: &str) -> Result<()> {
        let target = self.root.join(relative);
        tokio::fs::remove_file(&target)
            .await
            .with_context(|| format!("Failed to remove {}", target.display()))
    }
}

/// Decodes the payload to make sure it really is an image.
pub fn check_image(bytes: &[u8]) -> ImageResult<ImageFormat> {
    let format = image::guess_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)?;
    Ok(format)
}

/// [`check_image`] on the blocking pool.
pub async fn verify_image(data: Bytes) -> Result<ImageResult<ImageFormat>> {
    tokio::task::spawn_blocking(move || check_image(&data))
        .await
        .context("Image check task failed")
}

/// `uploads/recipe/<uuid>.<ext>`, keeping the uploaded file's extension and
/// falling back to the detected format's usual one. An extension that names
/// no image format is refused.
pub fn recipe_image_path(
    original_name: &str,
    format: ImageFormat,
) -> Result<String, DisallowedExtension> {
    let ext = match Path::new(original_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => {
            if ImageFormat::from_extension(ext).is_none() {
                return Err(DisallowedExtension(ext.to_string()));
            }
            ext
        }
        _ => format.extensions_str().first().copied().unwrap_or("img"),
    };

    Ok(format!("{}/{}.{}", RECIPE_UPLOAD_DIR, Uuid::new_v4(), ext))
}
