use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Could not create image directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// An artifact written to one of the image directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Location on disk.
    pub path: PathBuf,
    /// Path under which the artifact is served to clients.
    pub public_path: String,
}

/// A flat directory of uniquely-named image artifacts served under a public prefix.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_prefix: String,
}

impl ImageStore {
    pub fn open(root: impl AsRef<Path>, public_prefix: &str) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub fn original_name(file_name: &str) -> String {
        format!("original_{}_{}", Uuid::new_v4().simple(), secure_filename(file_name))
    }

    pub fn processed_name() -> String {
        format!("processed_{}.jpg", Uuid::new_v4().simple())
    }

    /// Timestamp and label keep contributions browsable; the uuid suffix keeps
    /// two submissions within the same second apart.
    pub fn contribution_name(at: DateTime<Utc>, label: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "contribution_{}_{}_{}.jpg",
            at.format("%Y%m%d%H%M%S"),
            secure_filename(label),
            &suffix[..8]
        )
    }

    pub fn save_bytes(&self, file_name: &str, data: &[u8]) -> Result<StoredImage, StorageError> {
        let stored = self.locate(file_name);
        fs::write(&stored.path, data).map_err(|source| StorageError::Write {
            path: stored.path.clone(),
            source,
        })?;
        log::debug!("Stored {} ({} bytes)", stored.path.display(), data.len());
        Ok(stored)
    }

    /// Encodes as JPEG; alpha is dropped since JPEG cannot carry it.
    pub fn save_jpeg(&self, file_name: &str, image: &DynamicImage) -> Result<StoredImage, StorageError> {
        let stored = self.locate(file_name);
        DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(&stored.path, ImageFormat::Jpeg)
            .map_err(|source| StorageError::Encode {
                path: stored.path.clone(),
                source,
            })?;
        log::debug!("Stored {}", stored.path.display());
        Ok(stored)
    }

    /// Best-effort removal used to clean up after a failed follow-up write.
    pub fn discard(&self, stored: &StoredImage) {
        if let Err(e) = fs::remove_file(&stored.path) {
            log::warn!("Failed to remove orphaned image {}: {}", stored.path.display(), e);
        }
    }

    fn locate(&self, file_name: &str) -> StoredImage {
        StoredImage {
            path: self.root.join(file_name),
            public_path: format!("{}/{}", self.public_prefix, file_name),
        }
    }
}

/// Reduces a client-supplied name to a safe single path component.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lowercased extension of a client-supplied file name, if it has one.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
