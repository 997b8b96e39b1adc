//! Disk storage for uploaded images.
//!
//! Files land under `<root>/<year>/<month>/<day>/<uuid>-<name>`; the
//! stored path is what the database keeps. Paths are validated on the way
//! back in so a crafted database row cannot read outside the root.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata for a file that has been written to disk.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: i64,
}

/// Filesystem-backed image storage.
#[derive(Debug)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    /// Opens storage rooted at the given directory, creating it if needed.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub async fn store(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredMedia, MediaStorageError> {
        if data.is_empty() {
            return Err(MediaStorageError::EmptyPayload);
        }

        let stored_path = self.build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        let mut hasher = Sha256::new();
        hasher.update(&data);

        Ok(StoredMedia {
            stored_path,
            checksum: hex::encode(hasher.finalize()),
            size_bytes: data.len() as i64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, MediaStorageError> {
        let absolute = self.resolve(stored_path)?;
        Ok(Bytes::from(fs::read(absolute).await?))
    }

    /// Removes a stored file. A missing file counts as removed.
    pub async fn delete(&self, stored_path: &str) -> Result<(), MediaStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MediaStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, MediaStorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(MediaStorageError::InvalidPath);
        }
        Ok(self.root.join(relative))
    }

    fn build_stored_path(&self, original_name: &str) -> String {
        let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
        let name = sanitize_filename(original_name);
        format!("{year}/{:02}/{day:02}/{}-{name}", month as u8, Uuid::new_v4())
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}
