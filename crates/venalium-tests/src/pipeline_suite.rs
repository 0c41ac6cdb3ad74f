//! Pipeline runs against scripted collaborator fakes: metadata enrichment
//! and PDF backup over the real persistence layer and in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use venalium_persist::{CollectionStore, Scope};
use venalium_research::{
    cancel_pair, CancelHandle, CancelReason, CloudFolderStore, CollabError, FetchedDocument,
    FolderId, MetadataEnricher, PdfBackup, PdfStatus, ProgressReporter, ResearchArticle,
    ResearchGroup, TextGenerator, TextRequest, UploadedFile, UrlFetcher, RESEARCH_GROUPS,
};
use venalium_store::{MemoryStore, OwnerId, ProjectId};

/// Replays queued replies in order; an exhausted queue fails the call.
/// Optionally fires a cancel handle after serving the n-th reply.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancelHandle)>>,
}

impl ScriptedGenerator {
    /// A generator that serves `replies` front to back.
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    /// Fires `handle` right after the `after_calls`-th reply is served.
    pub fn cancel_after(self, after_calls: usize, handle: CancelHandle) -> Self {
        *self.cancel_after.lock().unwrap() = Some((after_calls, handle));
        self
    }

    /// Calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _request: &TextRequest) -> Result<String, CollabError> {
        let served = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CollabError::Endpoint("script exhausted".into()))?;
        if let Some((after, handle)) = self.cancel_after.lock().unwrap().as_ref() {
            if served == *after {
                handle.cancel(CancelReason::UserRequested);
            }
        }
        Ok(reply)
    }
}

/// Serves canned bodies by URL; unknown URLs fail.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl FakeFetcher {
    /// An empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a body and content type for `url`.
    pub fn serve(self, url: &str, body: &[u8], content_type: &str) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), (body.to_vec(), content_type.to_string()));
        self
    }
}

#[async_trait]
impl UrlFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, CollabError> {
        let bodies = self.bodies.lock().unwrap();
        let (body, content_type) = bodies
            .get(url)
            .ok_or_else(|| CollabError::Endpoint(format!("no body for {url}")))?;
        Ok(FetchedDocument {
            bytes: Bytes::from(body.clone()),
            content_type: content_type.clone(),
        })
    }
}

/// Records folder creations and uploads; ids are handed out sequentially.
#[derive(Default)]
pub struct FakeFolders {
    created: Mutex<Vec<(String, Option<String>)>>,
    uploads: Mutex<Vec<(String, String)>>,
    fail_uploads: bool,
}

impl FakeFolders {
    /// A folder store where everything succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A folder store whose uploads always fail.
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    /// (name, parent id) of every folder created, in order.
    pub fn created(&self) -> Vec<(String, Option<String>)> {
        self.created.lock().unwrap().clone()
    }

    /// (filename, parent id) of every upload, in order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudFolderStore for FakeFolders {
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderId>,
    ) -> Result<FolderId, CollabError> {
        let mut created = self.created.lock().unwrap();
        let id = FolderId::new(format!("folder-{}", created.len()));
        created.push((name.to_string(), parent.map(|p| p.as_str().to_string())));
        Ok(id)
    }

    async fn upload(
        &self,
        filename: &str,
        _mime_type: &str,
        _content: Bytes,
        parent: &FolderId,
    ) -> Result<UploadedFile, CollabError> {
        if self.fail_uploads {
            return Err(CollabError::Endpoint("quota exceeded".into()));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((filename.to_string(), parent.as_str().to_string()));
        Ok(UploadedFile {
            url: format!("https://drive.example/{filename}"),
        })
    }
}

fn collections() -> Arc<CollectionStore> {
    Arc::new(CollectionStore::new(Arc::new(MemoryStore::new())))
}

fn project_scope() -> Scope {
    Scope::project(OwnerId::new("owner-1"), ProjectId::new("p1"))
}

fn thin_article(id: &str, title: &str) -> ResearchArticle {
    ResearchArticle::new(id, title)
}

fn complete_article(id: &str) -> ResearchArticle {
    ResearchArticle {
        abstract_text:
            "A detailed abstract long enough to pass the usable-abstract floor for tests."
                .to_string(),
        methodology: Some("Systematic review".to_string()),
        pages: Some("1-20".to_string()),
        ..ResearchArticle::new(id, "Finished article")
    }
}

fn good_metadata_reply() -> &'static str {
    "```json\n{\"authors\": \"Doe, J.\", \"year\": \"2021\", \"pages\": \"55-70\", \
     \"keywords\": \"chunking, storage\", \
     \"abstract\": \"An abstract of comfortable length describing the study, its \
     design, its participants, and its principal findings in detail.\", \
     \"methodology\": \"Case study\"}\n```"
}

async fn persisted_group(collections: &CollectionStore, scope: &Scope, id: &str) -> ResearchGroup {
    collections
        .get(scope, RESEARCH_GROUPS, id)
        .await
        .unwrap()
        .expect("group persisted")
        .decode()
        .expect("group decodes")
}

#[tokio::test]
async fn test_enrichment_updates_and_persists_each_article() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec![good_metadata_reply()]));
    let enricher = MetadataEnricher::new(generator.clone(), collections.clone(), "model-a");

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![thin_article("a1", "Thin paper"), complete_article("a2")];

    let (progress, rx) = ProgressReporter::channel();
    let (token, _handle) = cancel_pair();
    let stats = enricher
        .enrich_group(&scope, &mut group, &token, &progress)
        .await;

    assert_eq!(stats.examined, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.failed, 0);
    assert!(!stats.cancelled);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(rx.borrow().message, "Analysis complete");

    let stored = persisted_group(&collections, &scope, "g1").await;
    let enriched = &stored.papers[0];
    assert_eq!(enriched.authors, "Doe, J.");
    assert_eq!(enriched.year, "2021");
    assert_eq!(enriched.pages.as_deref(), Some("55-70"));
    assert_eq!(enriched.methodology.as_deref(), Some("Case study"));
    assert!(!enriched.needs_enrichment());
    // the complete article was never touched
    assert_eq!(stored.papers[1], complete_article("a2"));
}

#[tokio::test]
async fn test_enrichment_counts_unparseable_replies_as_failures() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec!["I could not find anything."]));
    let enricher = MetadataEnricher::new(generator, collections.clone(), "model-a");

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![thin_article("a1", "Thin paper")];

    let (token, _handle) = cancel_pair();
    let stats = enricher
        .enrich_group(&scope, &mut group, &token, &ProgressReporter::sink())
        .await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 0);
    // nothing was persisted for a run with no successful merges
    assert!(collections
        .get(&scope, RESEARCH_GROUPS, "g1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_enrichment_never_overwrites_with_empty_fields() {
    let collections = collections();
    let scope = project_scope();
    let reply = "{\"authors\": \"\", \"year\": \"2020\", \"pages\": \"10-20\", \
                 \"abstract\": \"A reply abstract that is clearly long enough to be \
                 considered usable by the enrichment filter.\", \
                 \"methodology\": \"Survey\"}";
    let generator = Arc::new(ScriptedGenerator::new(vec![reply]));
    let enricher = MetadataEnricher::new(generator, collections.clone(), "model-a");

    let mut group = ResearchGroup::new("g1", "Methods");
    let mut article = thin_article("a1", "Thin paper");
    article.authors = "Known Author".to_string();
    group.papers = vec![article];

    let (token, _handle) = cancel_pair();
    enricher
        .enrich_group(&scope, &mut group, &token, &ProgressReporter::sink())
        .await;

    let stored = persisted_group(&collections, &scope, "g1").await;
    assert_eq!(stored.papers[0].authors, "Known Author");
    assert_eq!(stored.papers[0].year, "2020");
}

#[tokio::test]
async fn test_enrichment_cancellation_keeps_finished_work() {
    let collections = collections();
    let scope = project_scope();
    let (token, handle) = cancel_pair();
    let generator = Arc::new(
        ScriptedGenerator::new(vec![good_metadata_reply(), good_metadata_reply()])
            .cancel_after(1, handle),
    );
    let enricher = MetadataEnricher::new(generator.clone(), collections.clone(), "model-a");

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![
        thin_article("a1", "First paper"),
        thin_article("a2", "Second paper"),
    ];

    let (progress, rx) = ProgressReporter::channel();
    let stats = enricher
        .enrich_group(&scope, &mut group, &token, &progress)
        .await;

    assert!(stats.cancelled);
    assert_eq!(stats.examined, 2);
    assert_eq!(stats.updated, 1);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(rx.borrow().message, "Analysis cancelled");

    // the first article's merge survived the cancellation, the second was
    // never touched
    let stored = persisted_group(&collections, &scope, "g1").await;
    assert!(!stored.papers[0].needs_enrichment());
    assert!(stored.papers[1].needs_enrichment());
}

fn backup_pipeline(
    generator: Arc<ScriptedGenerator>,
    fetcher: Arc<FakeFetcher>,
    folders: Arc<FakeFolders>,
    collections: Arc<CollectionStore>,
) -> PdfBackup {
    PdfBackup::new(
        generator,
        fetcher,
        folders,
        collections,
        vec!["model-a".to_string(), "model-b".to_string()],
    )
}

#[tokio::test]
async fn test_backup_uploads_verified_pdf_and_remembers_folders() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec![
        "{\"pdfUrl\": \"https://host.example/a.pdf\"}",
    ]));
    let fetcher = Arc::new(FakeFetcher::new().serve(
        "https://host.example/a.pdf",
        b"%PDF-1.7 body",
        "application/pdf",
    ));
    let folders = Arc::new(FakeFolders::new());
    let backup = backup_pipeline(generator, fetcher, folders.clone(), collections.clone());

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![thin_article("a1", "Chunk lifecycles")];

    let (token, _handle) = cancel_pair();
    let stats = backup
        .backup_group(&scope, "Thesis", &mut group, &token, &ProgressReporter::sink())
        .await;

    assert_eq!(stats.backed_up, 1);
    assert_eq!(stats.direct_only, 0);
    assert_eq!(stats.failed, 0);

    // project folder at the root, group folder nested inside it
    assert_eq!(
        folders.created(),
        vec![
            ("Project: Thesis".to_string(), None),
            ("Methods".to_string(), Some("folder-0".to_string())),
        ]
    );
    let uploads = folders.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "folder-1");
    assert!(uploads[0].0.ends_with(".pdf"));

    let stored = persisted_group(&collections, &scope, "g1").await;
    assert_eq!(stored.drive_folder_id.as_deref(), Some("folder-1"));
    assert_eq!(stored.papers[0].pdf_status, Some(PdfStatus::Success));
    assert!(stored.papers[0]
        .pdf_url
        .as_deref()
        .unwrap()
        .starts_with("https://drive.example/"));

    // the project record remembers its folder for later runs
    let owner_scope = Scope::user(OwnerId::new("owner-1"));
    let project_record = collections
        .store()
        .get_record(&owner_scope.record_path("projects", "p1").unwrap())
        .await
        .unwrap()
        .expect("project record written");
    assert_eq!(project_record["driveFolderId"], "folder-0");
}

#[tokio::test]
async fn test_backup_keeps_direct_link_when_upload_fails() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec![
        "{\"pdfUrl\": \"https://host.example/a.pdf\"}",
    ]));
    let fetcher = Arc::new(FakeFetcher::new().serve(
        "https://host.example/a.pdf",
        b"%PDF-1.7 body",
        "application/pdf",
    ));
    let folders = Arc::new(FakeFolders::failing_uploads());
    let backup = backup_pipeline(generator, fetcher, folders, collections.clone());

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![thin_article("a1", "Chunk lifecycles")];

    let (token, _handle) = cancel_pair();
    let stats = backup
        .backup_group(&scope, "Thesis", &mut group, &token, &ProgressReporter::sink())
        .await;

    assert_eq!(stats.direct_only, 1);
    assert_eq!(stats.backed_up, 0);
    let stored = persisted_group(&collections, &scope, "g1").await;
    assert_eq!(
        stored.papers[0].pdf_url.as_deref(),
        Some("https://host.example/a.pdf")
    );
    assert_eq!(stored.papers[0].pdf_status, Some(PdfStatus::Success));
}

#[tokio::test]
async fn test_backup_rejects_html_and_marks_failed() {
    let collections = collections();
    let scope = project_scope();
    // model-a answers a paywall page, model-b finds nothing
    let generator = Arc::new(ScriptedGenerator::new(vec![
        "{\"pdfUrl\": \"https://host.example/paywall\"}",
        "{\"pdfUrl\": null}",
    ]));
    let fetcher = Arc::new(FakeFetcher::new().serve(
        "https://host.example/paywall",
        b"<html><body>Sign in</body></html>",
        "text/html; charset=utf-8",
    ));
    let backup = backup_pipeline(
        generator,
        fetcher,
        Arc::new(FakeFolders::new()),
        collections.clone(),
    );

    let mut group = ResearchGroup::new("g1", "Methods");
    group.papers = vec![thin_article("a1", "Chunk lifecycles")];

    let (token, _handle) = cancel_pair();
    let stats = backup
        .backup_group(&scope, "Thesis", &mut group, &token, &ProgressReporter::sink())
        .await;

    assert_eq!(stats.failed, 1);
    let stored = persisted_group(&collections, &scope, "g1").await;
    assert_eq!(stored.papers[0].pdf_status, Some(PdfStatus::Failed));
    assert!(stored.papers[0].pdf_url.is_none());
}

#[tokio::test]
async fn test_backup_reuses_remembered_group_folder() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec![
        "{\"pdfUrl\": \"https://host.example/a.pdf\"}",
    ]));
    let fetcher = Arc::new(FakeFetcher::new().serve(
        "https://host.example/a.pdf",
        b"%PDF-1.7 body",
        "application/pdf",
    ));
    let folders = Arc::new(FakeFolders::new());
    let backup = backup_pipeline(generator, fetcher, folders.clone(), collections.clone());

    let mut group = ResearchGroup::new("g1", "Methods");
    group.drive_folder_id = Some("folder-known".to_string());
    group.papers = vec![thin_article("a1", "Chunk lifecycles")];

    let (token, _handle) = cancel_pair();
    backup
        .backup_group(&scope, "Thesis", &mut group, &token, &ProgressReporter::sink())
        .await;

    assert!(folders.created().is_empty());
    assert_eq!(folders.uploads()[0].1, "folder-known");
}

#[tokio::test]
async fn test_backup_cancelled_before_start_touches_nothing() {
    let collections = collections();
    let scope = project_scope();
    let generator = Arc::new(ScriptedGenerator::new(vec![]));
    let backup = backup_pipeline(
        generator.clone(),
        Arc::new(FakeFetcher::new()),
        Arc::new(FakeFolders::new()),
        collections.clone(),
    );

    let mut group = ResearchGroup::new("g1", "Methods");
    group.drive_folder_id = Some("folder-known".to_string());
    group.papers = vec![thin_article("a1", "Chunk lifecycles")];

    let (token, handle) = cancel_pair();
    handle.cancel(CancelReason::Shutdown);
    let stats = backup
        .backup_group(&scope, "Thesis", &mut group, &token, &ProgressReporter::sink())
        .await;

    assert!(stats.cancelled);
    assert_eq!(stats.examined, 1);
    assert_eq!(generator.call_count(), 0);
    assert!(group.papers[0].pdf_status.is_none());
}

/// `Value`-level check that persisted groups keep the wire field names the
/// rest of the application reads.
#[tokio::test]
async fn test_persisted_group_uses_wire_field_names() {
    let collections = collections();
    let scope = project_scope();
    let mut group = ResearchGroup::new("g1", "Methods");
    let mut article = complete_article("a1");
    article.pdf_status = Some(PdfStatus::Success);
    group.papers = vec![article];
    group.save(&collections, &scope).await.unwrap();

    let item = collections
        .get(&scope, RESEARCH_GROUPS, "g1")
        .await
        .unwrap()
        .unwrap();
    let paper: &Value = &item.data["papers"][0];
    assert!(paper.get("abstract").is_some());
    assert_eq!(paper["pdfStatus"], "success");
    assert!(paper.get("abstract_text").is_none());
}
