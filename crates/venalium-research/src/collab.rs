//! External collaborator seams: text generation, URL fetching, and cloud
//! folder storage.
//!
//! The pipelines only ever talk to these traits; production wiring binds
//! them to real HTTP endpoints while tests bind scripted fakes.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Errors from collaborator endpoints.
#[derive(Debug, Error)]
pub enum CollabError {
    /// The endpoint failed or returned a non-success status.
    #[error("endpoint error: {0}")]
    Endpoint(String),

    /// The endpoint answered with something unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One text-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    /// Model identifier understood by the endpoint.
    pub model: String,
    /// Task label routed by the endpoint (for example `summary`).
    pub task: String,
    /// The prompt itself.
    pub prompt: String,
    /// Ask the endpoint to ground the answer in live search results.
    pub use_grounding: bool,
}

impl TextRequest {
    /// A grounded request; the pipelines always want search-backed answers.
    pub fn grounded(
        model: impl Into<String>,
        task: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            task: task.into(),
            prompt: prompt.into(),
            use_grounding: true,
        }
    }
}

/// Text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one request and returns the raw reply text.
    async fn generate(&self, request: &TextRequest) -> Result<String, CollabError>;
}

/// A document fetched from a URL.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Raw body bytes.
    pub bytes: Bytes,
    /// Content type reported by the server.
    pub content_type: String,
}

impl FetchedDocument {
    /// True when the body is plausibly a PDF: either the server said so or
    /// the bytes carry the PDF magic header.
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("application/pdf")
            || self.bytes.starts_with(b"%PDF-")
    }
}

/// Fetches documents over HTTP (usually through a CORS-relaxing proxy).
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Downloads `url` and returns body plus content type.
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, CollabError>;
}

/// Identifier of a folder in the cloud file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId(String);

impl FolderId {
    /// Creates a folder id from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file stored in the cloud file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Shareable URL of the stored file.
    pub url: String,
}

/// Cloud folder storage collaborator (a Drive-style file store).
#[async_trait]
pub trait CloudFolderStore: Send + Sync {
    /// Creates a folder, optionally inside `parent`, returning its id.
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderId>,
    ) -> Result<FolderId, CollabError>;

    /// Uploads a file into `parent` and returns its shareable URL.
    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        content: Bytes,
        parent: &FolderId,
    ) -> Result<UploadedFile, CollabError>;
}

/// Strips the Markdown code fences models wrap around JSON payloads.
pub fn extract_json(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_fences() {
        let fenced = "```json\n{\"year\": \"2021\"}\n```";
        assert_eq!(extract_json(fenced), "{\"year\": \"2021\"}");
    }

    #[test]
    fn test_extract_json_passes_plain_payloads() {
        assert_eq!(extract_json("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_handles_bare_fences() {
        assert_eq!(extract_json("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_pdf_detection() {
        let by_type = FetchedDocument {
            bytes: Bytes::from_static(b"binary"),
            content_type: "application/pdf".to_string(),
        };
        assert!(by_type.is_pdf());

        let by_magic = FetchedDocument {
            bytes: Bytes::from_static(b"%PDF-1.7 ..."),
            content_type: "application/octet-stream".to_string(),
        };
        assert!(by_magic.is_pdf());

        let html = FetchedDocument {
            bytes: Bytes::from_static(b"<html><body>paywall</body></html>"),
            content_type: "text/html; charset=utf-8".to_string(),
        };
        assert!(!html.is_pdf());
    }
}
