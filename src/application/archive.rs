//! Whole-wiki export and import.
//!
//! The archive is a JSON object mapping each title to its author, update
//! timestamp and source body. Import applies every entry as a page save
//! with the recorded author and timestamp, so export followed by import
//! reproduces the same pages. Both directions are admin-only and shared
//! between the HTTP handlers and the CLI subcommands.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::pages::label_union;
use crate::application::render::ContentRenderer;
use crate::application::repos::{PageStore, SavePageParams};
use crate::application::settings::WikiSettings;
use crate::cache::InvalidationEngine;
use crate::domain::source::PageSource;
use crate::domain::types::Principal;
use crate::util::timezone;

/// Download name for the export attachment.
pub const ARCHIVE_FILE_NAME: &str = "quaderno-export.json";

/// One page in the archive. `updated` is UTC, `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArchivedPage {
    pub author: Option<String>,
    pub updated: String,
    pub body: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub saved: usize,
    pub deleted: usize,
}

#[derive(Clone)]
pub struct ArchiveService {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    renderer: Arc<dyn ContentRenderer>,
    invalidation: Arc<InvalidationEngine>,
}

impl ArchiveService {
    pub fn new(
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessPolicy>,
        renderer: Arc<dyn ContentRenderer>,
        invalidation: Arc<InvalidationEngine>,
    ) -> Self {
        Self {
            pages,
            access,
            renderer,
            invalidation,
        }
    }

    /// Serializes every stored page, keyed by title.
    pub async fn export(&self, principal: &Principal) -> Result<String, WikiError> {
        self.check_admin(principal)?;
        self.export_all().await
    }

    /// The export body without the admin gate, for the CLI which runs
    /// with direct database access and no signed-in user.
    pub async fn export_all(&self) -> Result<String, WikiError> {
        let mut archive = BTreeMap::new();
        for page in self.pages.list_all().await? {
            archive.insert(
                page.title,
                ArchivedPage {
                    author: page.author_email,
                    updated: timezone::archive_timestamp(page.updated_at),
                    body: page.body,
                },
            );
        }
        info!(pages = archive.len(), "Exported page archive");
        serde_json::to_string_pretty(&archive)
            .map_err(|err| WikiError::internal_from("archive serialization failed", err))
    }

    /// Applies an archive. Merge mode only upserts; a full import also
    /// deletes stored pages the archive does not mention.
    pub async fn import(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        archive_json: &str,
        merge: bool,
    ) -> Result<ImportReport, WikiError> {
        self.check_admin(principal)?;
        self.apply_archive(settings, archive_json, merge).await
    }

    /// The import body without the admin gate, shared with the CLI.
    pub async fn apply_archive(
        &self,
        settings: &WikiSettings,
        archive_json: &str,
        merge: bool,
    ) -> Result<ImportReport, WikiError> {
        let archive: BTreeMap<String, ArchivedPage> = serde_json::from_str(archive_json)
            .map_err(|_| WikiError::bad_request("The archive could not be parsed."))?;
        let interwiki = settings.interwiki();

        let mut report = ImportReport::default();
        for (title, entry) in &archive {
            let updated = timezone::parse_archive_timestamp(&entry.updated).map_err(|_| {
                WikiError::bad_request(format!("Invalid timestamp on page {title}."))
            })?;
            let old_labels = self
                .pages
                .find_by_title(title)
                .await?
                .map(|page| page.labels)
                .unwrap_or_default();

            let source = PageSource::parse(&entry.body);
            let links = self.renderer.render(source.body(), &interwiki).links;
            let saved = self
                .pages
                .save_page(SavePageParams {
                    title: title.clone(),
                    body: entry.body.clone(),
                    author_email: entry.author.clone(),
                    links,
                    updated_at: Some(updated),
                })
                .await?;

            self.invalidation
                .purge_page(title, &label_union(old_labels, saved.labels));
            report.saved += 1;
        }

        if !merge {
            for page in self.pages.list_all().await? {
                if archive.contains_key(&page.title) {
                    continue;
                }
                if self.pages.delete_page(&page.title).await? {
                    self.invalidation.purge_page(&page.title, &page.labels);
                    report.deleted += 1;
                }
            }
        }

        info!(
            saved = report.saved,
            deleted = report.deleted,
            merge,
            "Imported page archive"
        );
        Ok(report)
    }

    fn check_admin(&self, principal: &Principal) -> Result<(), WikiError> {
        if self.access.is_admin(principal) {
            Ok(())
        } else {
            Err(WikiError::forbidden("Only admins may move data around."))
        }
    }
}
