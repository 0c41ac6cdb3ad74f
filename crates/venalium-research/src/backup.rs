//! Locates open-access PDFs for articles and stores copies in the cloud
//! folder store.
//!
//! Each article without a PDF gets a search prompt per configured model
//! until one yields a link that actually fetches as a PDF. The file is
//! uploaded into a per-group folder nested under a per-project folder;
//! folder ids are remembered on the group and project records so later
//! runs reuse them. Every state change is persisted immediately, and an
//! article whose search fails is marked `failed` so the run moves on.

use crate::article::{PdfStatus, ResearchArticle, ResearchGroup};
use crate::cancel::CancelToken;
use crate::collab::{
    extract_json, CloudFolderStore, FolderId, TextGenerator, TextRequest, UrlFetcher,
};
use crate::progress::ProgressReporter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use venalium_persist::{CollectionStore, Scope};

/// Collection holding per-project records such as the cloud folder id.
pub const PROJECTS: &str = "projects";

/// Title characters kept when building an upload filename.
const FILENAME_TITLE_CHARS: usize = 50;

/// Counters describing one backup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupStats {
    /// Articles that were missing a PDF.
    pub examined: u64,
    /// PDFs uploaded into the cloud folder.
    pub backed_up: u64,
    /// Articles left with a direct link because no folder was available
    /// or the upload failed.
    pub direct_only: u64,
    /// Articles for which no usable PDF was found.
    pub failed: u64,
    /// True when the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Shape of the search reply the models are asked for.
#[derive(Debug, Deserialize)]
struct PdfSuggestion {
    #[serde(rename = "pdfUrl", default)]
    pdf_url: Option<String>,
}

/// What one article's search produced.
enum PdfOutcome {
    /// A copy now lives in the cloud folder at this URL.
    Uploaded(String),
    /// A working PDF link that was not uploaded.
    DirectLink(String),
    /// No model produced a fetchable PDF.
    NotFound,
    /// Cancellation was observed mid-search.
    Cancelled,
}

/// Runs PDF search and backup over one research group.
pub struct PdfBackup {
    generator: Arc<dyn TextGenerator>,
    fetcher: Arc<dyn UrlFetcher>,
    folders: Arc<dyn CloudFolderStore>,
    collections: Arc<CollectionStore>,
    models: Vec<String>,
}

impl PdfBackup {
    /// A backup pipeline trying `models` in order for every article.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        fetcher: Arc<dyn UrlFetcher>,
        folders: Arc<dyn CloudFolderStore>,
        collections: Arc<CollectionStore>,
        models: Vec<String>,
    ) -> Self {
        Self {
            generator,
            fetcher,
            folders,
            collections,
            models,
        }
    }

    /// Searches for and stores a PDF for every article in `group` that is
    /// missing one, saving the group after each result. Checks `cancel`
    /// between articles and between model attempts.
    #[instrument(skip_all, fields(group = %group.id))]
    pub async fn backup_group(
        &self,
        scope: &Scope,
        project_name: &str,
        group: &mut ResearchGroup,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> BackupStats {
        let folder = self.ensure_group_folder(scope, project_name, group).await;

        let targets: Vec<usize> = group
            .papers
            .iter()
            .enumerate()
            .filter(|(_, paper)| paper.needs_pdf())
            .map(|(index, _)| index)
            .collect();
        let total = targets.len();
        let mut stats = BackupStats {
            examined: total as u64,
            ..BackupStats::default()
        };

        for (done, index) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                progress.report(done, total, "PDF backup cancelled");
                break;
            }
            let title = group.papers[index].title.clone();
            progress.report(done + 1, total, format!("Searching PDF: {title}"));

            match self
                .locate_and_store(&group.papers[index], folder.as_ref(), cancel)
                .await
            {
                PdfOutcome::Uploaded(url) => {
                    group.papers[index].pdf_url = Some(url);
                    group.papers[index].pdf_status = Some(PdfStatus::Success);
                    stats.backed_up += 1;
                }
                PdfOutcome::DirectLink(url) => {
                    group.papers[index].pdf_url = Some(url);
                    group.papers[index].pdf_status = Some(PdfStatus::Success);
                    stats.direct_only += 1;
                }
                PdfOutcome::NotFound => {
                    group.papers[index].pdf_status = Some(PdfStatus::Failed);
                    stats.failed += 1;
                }
                PdfOutcome::Cancelled => {
                    stats.cancelled = true;
                    break;
                }
            }
            if let Err(e) = group.save(&self.collections, scope).await {
                warn!(title = %title, error = %e, "failed to persist PDF result");
            }
        }

        if !stats.cancelled {
            progress.report(total, total, "PDF backup complete");
        }
        info!(
            examined = stats.examined,
            backed_up = stats.backed_up,
            direct_only = stats.direct_only,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "pdf backup finished"
        );
        stats
    }

    /// Tries each model in turn until one yields a link that fetches as a
    /// real PDF, then uploads it when a folder is available.
    async fn locate_and_store(
        &self,
        article: &ResearchArticle,
        folder: Option<&FolderId>,
        cancel: &CancelToken,
    ) -> PdfOutcome {
        for model in &self.models {
            if cancel.is_cancelled() {
                return PdfOutcome::Cancelled;
            }
            let request = TextRequest::grounded(model.as_str(), "pdf-search", pdf_prompt(article));
            let reply = match self.generator.generate(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(%model, error = %e, "PDF search call failed");
                    continue;
                }
            };
            let Some(url) = parse_pdf_url(&reply) else {
                debug!(%model, "model found no PDF link");
                continue;
            };
            let document = match self.fetcher.fetch(&url).await {
                Ok(document) => document,
                Err(e) => {
                    warn!(%url, error = %e, "PDF download failed");
                    continue;
                }
            };
            if !document.is_pdf() {
                debug!(%url, "fetched body is not a PDF");
                continue;
            }
            let Some(folder) = folder else {
                return PdfOutcome::DirectLink(url);
            };
            match self
                .folders
                .upload(
                    &pdf_filename(&article.title),
                    "application/pdf",
                    document.bytes.clone(),
                    folder,
                )
                .await
            {
                Ok(uploaded) => return PdfOutcome::Uploaded(uploaded.url),
                Err(e) => {
                    warn!(%url, error = %e, "upload failed, keeping the direct link");
                    return PdfOutcome::DirectLink(url);
                }
            }
        }
        PdfOutcome::NotFound
    }

    /// Returns the group's folder, creating and persisting it on first use.
    /// When no folder can be created the run falls back to direct links.
    async fn ensure_group_folder(
        &self,
        scope: &Scope,
        project_name: &str,
        group: &mut ResearchGroup,
    ) -> Option<FolderId> {
        if let Some(id) = &group.drive_folder_id {
            return Some(FolderId::new(id));
        }
        let parent = self.ensure_project_folder(scope, project_name).await;
        let folder = match self
            .folders
            .create_folder(&group_folder_name(&group.name), parent.as_ref())
            .await
        {
            Ok(folder) => folder,
            Err(e) => {
                warn!(error = %e, "could not create the group folder");
                return None;
            }
        };
        group.drive_folder_id = Some(folder.as_str().to_string());
        if let Err(e) = group.save(&self.collections, scope).await {
            warn!(error = %e, "failed to persist the group folder id");
        }
        Some(folder)
    }

    /// Finds or creates the per-project parent folder, remembering its id
    /// on the project record. Owner-level scopes have no project folder.
    async fn ensure_project_folder(&self, scope: &Scope, project_name: &str) -> Option<FolderId> {
        let project = scope.project_id()?;
        let owner_scope = Scope::user(scope.owner().clone());

        match self
            .collections
            .get(&owner_scope, PROJECTS, project.as_str())
            .await
        {
            Ok(Some(record)) => {
                if let Some(id) = record.data.get("driveFolderId").and_then(Value::as_str) {
                    return Some(FolderId::new(id));
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not read the project record"),
        }

        let folder = match self
            .folders
            .create_folder(&format!("Project: {project_name}"), None)
            .await
        {
            Ok(folder) => folder,
            Err(e) => {
                warn!(error = %e, "could not create the project folder");
                return None;
            }
        };

        let note = json!({ "driveFolderId": folder.as_str() });
        match owner_scope.record_path(PROJECTS, project.as_str()) {
            Ok(path) => {
                if let Err(e) = self.collections.store().set_record(&path, note, true).await {
                    warn!(error = %e, "failed to remember the project folder id");
                }
            }
            Err(e) => warn!(error = %e, "unusable project record path"),
        }
        Some(folder)
    }
}

// Only absolute http(s) links are worth fetching; models sometimes answer
// with prose or a bare domain.
fn parse_pdf_url(reply: &str) -> Option<String> {
    let suggestion: PdfSuggestion = serde_json::from_str(&extract_json(reply)).ok()?;
    suggestion.pdf_url.filter(|url| url.starts_with("http"))
}

fn pdf_prompt(article: &ResearchArticle) -> String {
    format!(
        "Find a direct, freely accessible PDF download link for this \
         article. Reply with a single JSON object using the key pdfUrl, for \
         example {{\"pdfUrl\": \"https://...\"}}. Use null when no \
         open-access PDF exists.\n\
         Title: {}\nAuthors: {}\nDOI: {}\nLink: {}",
        article.title, article.authors, article.doi, article.link
    )
}

fn pdf_filename(title: &str) -> String {
    let stem: String = title.chars().take(FILENAME_TITLE_CHARS).collect();
    format!("{}.pdf", stem.trim())
}

fn group_folder_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "Research Group".to_string()
    } else {
        trimmed.to_string()
    }
}
