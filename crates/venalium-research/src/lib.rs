#![warn(missing_docs)]
//! Venalium research pipelines.
//!
//! Long-running, cancellable passes over a research group's articles:
//! [`MetadataEnricher`] fills missing abstracts, methodology, and citation
//! fields through a text-generation collaborator, and [`PdfBackup`] locates
//! open-access PDFs and mirrors them into the project's cloud folder. Both
//! persist the whole group through the chunk-aware persistence layer after
//! every article, so interrupting a run never loses completed work.

pub mod article;
pub mod backup;
pub mod cancel;
pub mod collab;
pub mod enrich;
pub mod progress;

pub use article::{PdfStatus, ResearchArticle, ResearchGroup, RESEARCH_GROUPS};
pub use backup::{BackupStats, PdfBackup, PROJECTS};
pub use cancel::{cancel_pair, CancelHandle, CancelReason, CancelToken};
pub use collab::{
    extract_json, CloudFolderStore, CollabError, FetchedDocument, FolderId, TextGenerator,
    TextRequest, UploadedFile, UrlFetcher,
};
pub use enrich::{EnrichStats, MetadataEnricher};
pub use progress::{Progress, ProgressReporter};
