//! Image uploads and the image pages around them.
//!
//! Files are validated by sniffing their dimensions, stored on disk
//! through [`MediaStorage`] and tracked in the image table. Pages embed
//! an image with `[[Image:<id>]]`; the embed target records a backlink
//! under that synthetic title, which is what the image page lists as
//! "pages using this image".

use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::repos::{ImageStore, PageStore};
use crate::application::settings::WikiSettings;
use crate::domain::entities::ImageRecord;
use crate::domain::types::Principal;
use crate::infra::media::{MediaStorage, MediaStorageError};
use crate::presentation::views::{ImageCard, ImageDetailView, ImageListView, PageLink};
use crate::util::{timezone, urls};

const IMAGE_LIST_LIMIT: u32 = 50;

/// Raw image bytes ready to be served.
pub struct ImageFile {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct ImageService {
    images: Arc<dyn ImageStore>,
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    media: Arc<MediaStorage>,
}

impl ImageService {
    pub fn new(
        images: Arc<dyn ImageStore>,
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessPolicy>,
        media: Arc<MediaStorage>,
    ) -> Self {
        Self {
            images,
            pages,
            access,
            media,
        }
    }

    /// Gate shared by the upload form and the upload itself.
    pub fn check_can_upload(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<(), WikiError> {
        if self.access.can_upload_images(settings, principal) {
            Ok(())
        } else {
            Err(WikiError::forbidden("You may not upload images."))
        }
    }

    /// Stores an uploaded file and returns the new image id.
    pub async fn upload(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        file_name: &str,
        declared_type: Option<&str>,
        data: Bytes,
    ) -> Result<Uuid, WikiError> {
        self.check_can_upload(settings, principal)?;

        let dimensions = imagesize::blob_size(&data)
            .map_err(|_| WikiError::bad_request("That does not look like an image."))?;
        let content_type = resolve_content_type(file_name, declared_type);

        let stored = self.media.store(file_name, data).await.map_err(store_error)?;
        let record = ImageRecord {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            stored_path: stored.stored_path,
            content_type,
            width: dimensions.width as u32,
            height: dimensions.height as u32,
            size_bytes: stored.size_bytes,
            checksum: stored.checksum,
            uploaded_by: principal.email().map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        };
        let id = record.id;
        self.images.insert_image(record).await?;
        info!(image = %id, name = file_name, "Image uploaded");
        Ok(id)
    }

    /// The image page: metadata, the embed snippet and referring pages.
    pub async fn detail(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        id: Uuid,
    ) -> Result<ImageDetailView, WikiError> {
        self.check_can_list(settings, principal)?;
        let record = self.find(id).await?;

        let embed_target = format!("Image:{id}");
        let backlinks = self
            .pages
            .backlinks_for(&embed_target)
            .await?
            .into_iter()
            .map(|title| PageLink {
                href: urls::page_href(&title),
                title,
            })
            .collect();

        Ok(ImageDetailView {
            file_name: record.file_name,
            width: record.width,
            height: record.height,
            size_display: format_size(record.size_bytes),
            file_url: format!("/w/image/file?key={id}"),
            embed_snippet: format!("[[{embed_target}]]"),
            uploaded_display: timezone::display_datetime(record.created_at, settings.timezone()),
            uploaded_by: record
                .uploaded_by
                .as_deref()
                .and_then(|email| email.split('@').next())
                .unwrap_or("anonymous")
                .to_string(),
            backlinks,
        })
    }

    pub async fn list(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<ImageListView, WikiError> {
        self.check_can_list(settings, principal)?;
        let images = self
            .images
            .list_recent(IMAGE_LIST_LIMIT)
            .await?
            .into_iter()
            .map(|record| ImageCard {
                view_url: format!("/w/image/view?key={}", record.id),
                file_url: format!("/w/image/file?key={}", record.id),
                file_name: record.file_name,
            })
            .collect();
        Ok(ImageListView {
            images,
            can_upload: self.access.can_upload_images(settings, principal),
        })
    }

    /// The stored bytes with their stored content type. Not gated: embeds
    /// must load wherever the embedding page is readable, and the ids are
    /// not enumerable.
    pub async fn serve_file(&self, id: Uuid) -> Result<ImageFile, WikiError> {
        let record = self.find(id).await?;
        let data = self
            .media
            .read(&record.stored_path)
            .await
            .map_err(store_error)?;
        Ok(ImageFile {
            content_type: record.content_type,
            data,
        })
    }

    async fn find(&self, id: Uuid) -> Result<ImageRecord, WikiError> {
        self.images
            .find_image(id)
            .await?
            .ok_or_else(|| WikiError::not_found("No such image."))
    }

    fn check_can_list(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<(), WikiError> {
        if self.access.can_list_pages(settings, principal) {
            Ok(())
        } else {
            Err(WikiError::forbidden("This wiki is private."))
        }
    }
}

fn resolve_content_type(file_name: &str, declared: Option<&str>) -> String {
    match declared {
        Some(value) if !value.is_empty() && value != "application/octet-stream" => {
            value.to_string()
        }
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

fn store_error(error: MediaStorageError) -> WikiError {
    match error {
        MediaStorageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            WikiError::not_found("No such image.")
        }
        other => WikiError::internal_from("image storage failed", other),
    }
}

fn format_size(bytes: i64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_content_type_wins_over_the_extension() {
        assert_eq!(
            resolve_content_type("shot.png", Some("image/png")),
            "image/png"
        );
        // Some browsers send a generic type; fall back to the name.
        assert_eq!(
            resolve_content_type("shot.png", Some("application/octet-stream")),
            "image/png"
        );
        assert_eq!(resolve_content_type("shot.jpeg", None), "image/jpeg");
        assert_eq!(
            resolve_content_type("mystery", None),
            "application/octet-stream"
        );
    }

    #[test]
    fn sizes_format_in_sensible_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
