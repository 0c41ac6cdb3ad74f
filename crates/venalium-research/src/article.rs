//! Research article and group records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use venalium_persist::{CollectionStore, PersistError, SaveOptions, SaveReceipt, Scope};

/// Collection holding research groups inside a project.
pub const RESEARCH_GROUPS: &str = "researchGroups";

/// Group field carrying the article list; designated as the bulk field so
/// manifests of chunked groups stay small.
const GROUP_BULK_FIELD: &str = "papers";

/// Placeholder some sources return instead of a real abstract.
const NO_ABSTRACT_PLACEHOLDER: &str = "No abstract available.";

/// Abstracts shorter than this are considered unusable stubs.
const MIN_ABSTRACT_CHARS: usize = 50;

/// Outcome of the PDF backup pass for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfStatus {
    /// A lookup is currently running.
    Searching,
    /// No usable PDF was found.
    Failed,
    /// A PDF link was verified (and usually mirrored).
    Success,
}

/// One article in a research group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchArticle {
    /// Stable id within the group.
    pub id: String,
    /// Article title.
    pub title: String,
    /// Author list as displayed.
    #[serde(default)]
    pub authors: String,
    /// Journal or venue.
    #[serde(default)]
    pub source: String,
    /// Publication year as displayed.
    #[serde(default)]
    pub year: String,
    /// DOI, when known.
    #[serde(default)]
    pub doi: String,
    /// Landing-page link.
    #[serde(default)]
    pub link: String,
    /// Abstract text.
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// Comma-separated keywords.
    #[serde(default)]
    pub keywords: String,
    /// Page range, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    /// Study methodology summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    /// Direct or mirrored PDF link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Outcome of the last PDF backup attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_status: Option<PdfStatus>,
}

impl ResearchArticle {
    /// A new article carrying only id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: String::new(),
            source: String::new(),
            year: String::new(),
            doi: String::new(),
            link: String::new(),
            abstract_text: String::new(),
            keywords: String::new(),
            pages: None,
            methodology: None,
            pdf_url: None,
            pdf_status: None,
        }
    }

    /// True when the record is missing fields the metadata enricher fills:
    /// a usable abstract, a methodology summary, and a page range.
    pub fn needs_enrichment(&self) -> bool {
        let thin_abstract = self.abstract_text.trim().is_empty()
            || self.abstract_text == NO_ABSTRACT_PLACEHOLDER
            || self.abstract_text.chars().count() < MIN_ABSTRACT_CHARS;
        thin_abstract
            || self.methodology.as_deref().map_or(true, |m| m.trim().is_empty())
            || self.pages.as_deref().map_or(true, |p| p.trim().is_empty())
    }

    /// True when no PDF link has been secured yet. Articles whose landing
    /// link already points at a PDF are left alone.
    pub fn needs_pdf(&self) -> bool {
        self.pdf_url.is_none() && !self.link.ends_with(".pdf")
    }
}

/// A named set of articles persisted as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchGroup {
    /// Record id within the researchGroups collection.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Articles in the group.
    #[serde(default)]
    pub papers: Vec<ResearchArticle>,
    /// Cloud folder holding this group's PDF backups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_folder_id: Option<String>,
}

impl ResearchGroup {
    /// An empty group.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            papers: Vec::new(),
            drive_folder_id: None,
        }
    }

    /// Persists the whole group under its id, with the article list as the
    /// designated bulk field.
    pub async fn save(
        &self,
        collections: &CollectionStore,
        scope: &Scope,
    ) -> Result<SaveReceipt, PersistError> {
        let document: Value = serde_json::to_value(self)?;
        collections
            .save_keyed(
                scope,
                RESEARCH_GROUPS,
                &self.id,
                document,
                &SaveOptions::with_bulk_field(GROUP_BULK_FIELD),
            )
            .await
    }
}
