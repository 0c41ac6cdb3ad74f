//! Fills missing article metadata through the text-generation collaborator.
//!
//! Each thin article gets one grounded model call; non-empty fields from
//! the reply overlay the stored record, and the whole group is persisted
//! after every merge so an interrupted run keeps everything finished so
//! far. Failures are per-article: a bad reply or a failed save is counted
//! and the run moves on.

use crate::article::{ResearchArticle, ResearchGroup};
use crate::cancel::CancelToken;
use crate::collab::{extract_json, TextGenerator, TextRequest};
use crate::progress::ProgressReporter;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use venalium_persist::{CollectionStore, Scope};

/// Counters describing one enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    /// Articles that needed enrichment.
    pub examined: u64,
    /// Articles updated and persisted.
    pub updated: u64,
    /// Articles skipped after a model, parse, or save failure.
    pub failed: u64,
    /// True when the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Fields the model is asked to supply.
#[derive(Debug, Deserialize)]
struct EnrichedFields {
    #[serde(default)]
    authors: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    pages: Option<String>,
    #[serde(default)]
    keywords: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    methodology: Option<String>,
}

/// Runs metadata enrichment over one research group.
pub struct MetadataEnricher {
    generator: Arc<dyn TextGenerator>,
    collections: Arc<CollectionStore>,
    model: String,
}

impl MetadataEnricher {
    /// An enricher that prompts `model` through `generator` and persists
    /// through `collections`.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        collections: Arc<CollectionStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            collections,
            model: model.into(),
        }
    }

    /// Enriches every thin article in `group`, saving the group after each
    /// update. Checks `cancel` between articles.
    #[instrument(skip_all, fields(group = %group.id))]
    pub async fn enrich_group(
        &self,
        scope: &Scope,
        group: &mut ResearchGroup,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> EnrichStats {
        let targets: Vec<usize> = group
            .papers
            .iter()
            .enumerate()
            .filter(|(_, paper)| paper.needs_enrichment())
            .map(|(index, _)| index)
            .collect();
        let total = targets.len();
        let mut stats = EnrichStats {
            examined: total as u64,
            ..EnrichStats::default()
        };

        for (done, index) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                progress.report(done, total, "Analysis cancelled");
                break;
            }
            let title = group.papers[index].title.clone();
            progress.report(done + 1, total, format!("Analyzing: {title}"));

            let request = TextRequest::grounded(
                &self.model,
                "summary",
                enrichment_prompt(&group.papers[index]),
            );
            let reply = match self.generator.generate(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(title = %title, error = %e, "metadata lookup failed");
                    stats.failed += 1;
                    continue;
                }
            };
            let fields: EnrichedFields = match serde_json::from_str(&extract_json(&reply)) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(title = %title, error = %e, "model reply was not valid JSON");
                    stats.failed += 1;
                    continue;
                }
            };

            apply_fields(&mut group.papers[index], fields);
            match group.save(&self.collections, scope).await {
                Ok(_) => stats.updated += 1,
                Err(e) => {
                    warn!(title = %title, error = %e, "failed to persist enriched group");
                    stats.failed += 1;
                }
            }
        }

        if !stats.cancelled {
            progress.report(total, total, "Analysis complete");
        }
        info!(
            examined = stats.examined,
            updated = stats.updated,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "enrichment finished"
        );
        stats
    }
}

// Non-empty reply fields win over stored ones; "N/A" pages are treated as
// missing so a later run can retry them.
fn apply_fields(article: &mut ResearchArticle, fields: EnrichedFields) {
    if let Some(authors) = non_empty(fields.authors) {
        article.authors = authors;
    }
    if let Some(year) = non_empty(fields.year) {
        article.year = year;
    }
    if let Some(pages) = non_empty(fields.pages).filter(|p| p != "N/A") {
        article.pages = Some(pages);
    }
    if let Some(keywords) = non_empty(fields.keywords) {
        article.keywords = keywords;
    }
    if let Some(abstract_text) = non_empty(fields.abstract_text) {
        article.abstract_text = abstract_text;
    }
    if let Some(methodology) = non_empty(fields.methodology) {
        article.methodology = Some(methodology);
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn enrichment_prompt(article: &ResearchArticle) -> String {
    format!(
        "Find the abstract, methodology, page range, keywords, authors, and \
         publication year for this article. Reply with a single JSON object \
         using the keys: abstract, methodology, pages, keywords, authors, \
         year. Use \"N/A\" for a page range you cannot determine.\n\
         Title: {}\nAuthors: {}\nYear: {}\nDOI: {}",
        article.title, article.authors, article.year, article.doi
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thin() -> ResearchArticle {
        ResearchArticle::new("a1", "Chunk lifecycles in document stores")
    }

    #[test]
    fn test_apply_fields_overlays_non_empty_values() {
        let mut article = thin();
        article.authors = "Original Author".to_string();
        apply_fields(
            &mut article,
            EnrichedFields {
                authors: Some(String::new()),
                year: Some("2022".to_string()),
                pages: Some("N/A".to_string()),
                keywords: None,
                abstract_text: Some("A long abstract with plenty of detail about the study design.".to_string()),
                methodology: Some("Survey".to_string()),
            },
        );
        assert_eq!(article.authors, "Original Author");
        assert_eq!(article.year, "2022");
        assert!(article.pages.is_none());
        assert!(article.keywords.is_empty());
        assert_eq!(article.methodology.as_deref(), Some("Survey"));
        assert!(article.abstract_text.starts_with("A long abstract"));
    }

    #[test]
    fn test_prompt_carries_citation_fields() {
        let mut article = thin();
        article.doi = "10.1000/demo".to_string();
        article.year = "2019".to_string();
        let prompt = enrichment_prompt(&article);
        assert!(prompt.contains("Chunk lifecycles in document stores"));
        assert!(prompt.contains("10.1000/demo"));
        assert!(prompt.contains("2019"));
    }

    #[test]
    fn test_reply_fields_parse_with_defaults() {
        let fields: EnrichedFields =
            serde_json::from_str("{\"abstract\": \"text\", \"extra\": 1}").unwrap();
        assert_eq!(fields.abstract_text.as_deref(), Some("text"));
        assert!(fields.year.is_none());
    }
}
