//! Save/load/delete over whole collections, with transparent chunking.
//!
//! [`CollectionStore`] is the single entry point applications use. Every
//! save sanitizes, stamps, serializes, and classifies the document, then
//! commits either one record or a manifest plus chunk records in one atomic
//! batch; stale chunk records from a previous layout are deleted in the
//! same batch. Loads fan out chunk reads per document and isolate failures
//! per item, so one damaged document never hides the rest of a collection.

use crate::chunk::{
    is_manifest, manifest_chunk_count, manifest_record, manifest_total_size, needs_chunking,
    reassemble_document, split_chunks, ChunkError, ChunkRecord, CHUNKS_SCOPE, FIELD_CHUNKED,
    FIELD_ID, FIELD_INDEX, FIELD_UPDATED_AT,
};
use crate::config::PersistConfig;
use crate::error::PersistError;
use crate::metrics::{MetricsSnapshot, PersistMetrics};
use crate::sanitize::sanitize;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use venalium_store::{
    Direction, DocumentId, DocumentStore, OwnerId, ProjectId, RecordPath, ScopePath, StoreError,
    Timestamp, WriteOp,
};

/// Root segment under which all owner data lives.
const USERS_SEGMENT: &str = "users";
/// Segment naming the per-owner project tree.
const PROJECTS_SEGMENT: &str = "projects";

/// Which owner, and optionally which project, a collection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    owner: OwnerId,
    project: Option<ProjectId>,
}

impl Scope {
    /// Collections directly under an owner: `users/{owner}/{collection}`.
    pub fn user(owner: OwnerId) -> Self {
        Self {
            owner,
            project: None,
        }
    }

    /// Collections inside one project:
    /// `users/{owner}/projects/{project}/{collection}`.
    pub fn project(owner: OwnerId, project: ProjectId) -> Self {
        Self {
            owner,
            project: Some(project),
        }
    }

    /// The owner this scope belongs to.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The project this scope is inside, if any.
    pub fn project_id(&self) -> Option<&ProjectId> {
        self.project.as_ref()
    }

    /// Path of `collection` under this scope.
    pub fn collection_path(&self, collection: &str) -> Result<ScopePath, StoreError> {
        let mut segments = vec![USERS_SEGMENT.to_string(), self.owner.as_str().to_string()];
        if let Some(project) = &self.project {
            segments.push(PROJECTS_SEGMENT.to_string());
            segments.push(project.as_str().to_string());
        }
        segments.push(collection.to_string());
        ScopePath::new(segments)
    }

    /// Path of one record inside `collection` under this scope.
    pub fn record_path(&self, collection: &str, id: &str) -> Result<RecordPath, StoreError> {
        self.collection_path(collection)?.record(id)
    }
}

/// Per-save options.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Top-level field carrying the document's bulk payload. A chunked save
    /// drops this field from the manifest so the manifest stays small; the
    /// full value still round-trips through the chunks. Without one, the
    /// manifest carries every top-level field.
    pub bulk_field: Option<String>,
}

impl SaveOptions {
    /// Options with a designated bulk field.
    pub fn with_bulk_field(field: impl Into<String>) -> Self {
        Self {
            bulk_field: Some(field.into()),
        }
    }
}

/// How a save was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// One record held the whole document.
    Single,
    /// A manifest plus chunk records hold the document.
    Chunked {
        /// Number of chunk records written.
        chunk_count: u32,
        /// Serialized byte length recorded in the manifest.
        total_size: u64,
    },
}

/// Proof of a completed save.
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    /// Id the document was stored under.
    pub id: DocumentId,
    /// Timestamp stamped into the stored record.
    pub updated_at: Timestamp,
    /// Single-record or chunked layout.
    pub outcome: SaveOutcome,
}

/// One item returned by [`CollectionStore::load`] or
/// [`CollectionStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Record id within the collection.
    pub id: DocumentId,
    /// The reconstructed document, or the raw manifest when reconstruction
    /// failed.
    pub data: Value,
    /// Why reconstruction failed, when it did.
    pub error: Option<String>,
}

impl LoadedDocument {
    /// True when the document reconstructed cleanly.
    pub fn is_intact(&self) -> bool {
        self.error.is_none()
    }

    /// Decodes the document into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Collection-level persistence facade over a [`DocumentStore`].
pub struct CollectionStore {
    store: Arc<dyn DocumentStore>,
    config: PersistConfig,
    metrics: Arc<PersistMetrics>,
}

impl CollectionStore {
    /// Facade with the default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: PersistConfig::default(),
            metrics: Arc::new(PersistMetrics::new()),
        }
    }

    /// Facade with an explicit configuration; invalid configs are rejected.
    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        config: PersistConfig,
    ) -> Result<Self, PersistError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            metrics: Arc::new(PersistMetrics::new()),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Point-in-time copy of the pipeline counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Underlying store, for callers that need raw record access.
    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Saves a document under the id carried in its `id` field.
    ///
    /// The document must be a JSON object with a non-empty string `id`. It
    /// is sanitized, stamped with `updatedAt`, and stored either as one
    /// record or as a manifest plus chunks depending on serialized size.
    #[instrument(skip(self, scope, document, options))]
    pub async fn save(
        &self,
        scope: &Scope,
        collection: &str,
        document: Value,
        options: &SaveOptions,
    ) -> Result<SaveReceipt, PersistError> {
        let id = document
            .get(FIELD_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(PersistError::MissingId)?;
        self.save_as(scope, collection, &id, document, options).await
    }

    /// Saves a document under a caller-chosen key, stamping the key into
    /// the document's `id` field. Used for well-known singleton records
    /// such as a project's current map.
    #[instrument(skip(self, scope, document, options))]
    pub async fn save_keyed(
        &self,
        scope: &Scope,
        collection: &str,
        key: &str,
        document: Value,
        options: &SaveOptions,
    ) -> Result<SaveReceipt, PersistError> {
        self.save_as(scope, collection, key, document, options).await
    }

    async fn save_as(
        &self,
        scope: &Scope,
        collection: &str,
        id: &str,
        document: Value,
        options: &SaveOptions,
    ) -> Result<SaveReceipt, PersistError> {
        if !document.is_object() {
            return Err(PersistError::InvalidDocument(
                "documents must be JSON objects".into(),
            ));
        }

        let (mut bounded, stats) = sanitize(&document, &self.config.limits);
        if !stats.is_clean() {
            warn!(
                strings = stats.strings_truncated,
                arrays = stats.arrays_truncated,
                depth = stats.depth_capped,
                id,
                "sanitizer cut oversized content"
            );
        }
        self.metrics.record_sanitize(&stats);

        let updated_at = Timestamp::now();
        if let Some(fields) = bounded.as_object_mut() {
            fields.insert(FIELD_ID.to_string(), Value::from(id));
            fields.insert(
                FIELD_UPDATED_AT.to_string(),
                Value::from(updated_at.as_millis()),
            );
        }

        let serialized = serde_json::to_string(&bounded)?;
        let total_bytes = serialized.len();

        let record_path = scope.record_path(collection, id)?;
        let chunk_scope = record_path.scope(CHUNKS_SCOPE)?;
        let stale = self.chunk_ids(&chunk_scope).await?;

        let mut ops = Vec::new();
        let mut cleared = 0u64;
        let outcome = if needs_chunking(total_bytes, self.config.chunk_threshold_bytes) {
            let chunks = split_chunks(&serialized, self.config.chunk_size_chars);
            let chunk_count = chunks.len() as u32;
            let manifest = manifest_record(
                &bounded,
                chunk_count,
                total_bytes as u64,
                options.bulk_field.as_deref(),
            );
            ops.push(WriteOp::set(record_path, manifest));
            for chunk in &chunks {
                let chunk_path = chunk_scope.record(&chunk.index.to_string())?;
                ops.push(WriteOp::set(chunk_path, serde_json::to_value(chunk)?));
            }
            // stale records beyond the new run would corrupt the next read
            for stale_id in &stale {
                if !is_live_chunk_id(stale_id, chunk_count) {
                    ops.push(WriteOp::delete(chunk_scope.record(stale_id)?));
                    cleared += 1;
                }
            }
            SaveOutcome::Chunked {
                chunk_count,
                total_size: total_bytes as u64,
            }
        } else {
            if let Some(fields) = bounded.as_object_mut() {
                fields.insert(FIELD_CHUNKED.to_string(), Value::Bool(false));
            }
            ops.push(WriteOp::set(record_path, bounded));
            for stale_id in &stale {
                ops.push(WriteOp::delete(chunk_scope.record(stale_id)?));
                cleared += 1;
            }
            SaveOutcome::Single
        };

        self.store.batch_write(ops).await?;

        match outcome {
            SaveOutcome::Single => self.metrics.record_single_save(),
            SaveOutcome::Chunked {
                chunk_count,
                total_size,
            } => {
                self.metrics.record_chunked_save(chunk_count as u64);
                debug!(id, chunk_count, total_size, "stored chunked document");
            }
        }
        if cleared > 0 {
            self.metrics.record_stale_chunks_cleared(cleared);
            debug!(id, cleared, "removed stale chunk records");
        }

        Ok(SaveReceipt {
            id: DocumentId::new(id),
            updated_at,
            outcome,
        })
    }

    /// Loads every document in a collection, newest first.
    ///
    /// Chunked documents are reassembled concurrently. A document whose
    /// chunks cannot be reassembled comes back carrying its manifest fields
    /// and an error note instead of failing the whole load.
    #[instrument(skip(self, scope))]
    pub async fn load(
        &self,
        scope: &Scope,
        collection: &str,
    ) -> Result<Vec<LoadedDocument>, PersistError> {
        let collection_path = scope.collection_path(collection)?;
        let rows = self
            .store
            .query_ordered(&collection_path, FIELD_UPDATED_AT, Direction::Descending)
            .await?;

        let collection_ref = &collection_path;
        let items = join_all(rows.into_iter().map(|(id, record)| async move {
            self.hydrate(collection_ref, id, record).await
        }))
        .await;

        self.metrics.record_documents_loaded(items.len() as u64);
        Ok(items)
    }

    /// Loads one document by id, reassembling chunks when needed.
    pub async fn get(
        &self,
        scope: &Scope,
        collection: &str,
        id: &str,
    ) -> Result<Option<LoadedDocument>, PersistError> {
        let collection_path = scope.collection_path(collection)?;
        let record_path = collection_path.record(id)?;
        let Some(record) = self.store.get_record(&record_path).await? else {
            return Ok(None);
        };
        Ok(Some(
            self.hydrate(&collection_path, DocumentId::new(id), record)
                .await,
        ))
    }

    /// Removes a document and all of its chunk records in one atomic batch.
    #[instrument(skip(self, scope))]
    pub async fn delete(
        &self,
        scope: &Scope,
        collection: &str,
        id: &str,
    ) -> Result<(), PersistError> {
        let record_path = scope.record_path(collection, id)?;
        let chunk_scope = record_path.scope(CHUNKS_SCOPE)?;

        let mut ops = Vec::new();
        for chunk_id in self.chunk_ids(&chunk_scope).await? {
            ops.push(WriteOp::delete(chunk_scope.record(&chunk_id)?));
        }
        ops.push(WriteOp::delete(record_path));
        self.store.batch_write(ops).await?;
        self.metrics.record_delete();
        Ok(())
    }

    async fn hydrate(
        &self,
        collection_path: &ScopePath,
        id: DocumentId,
        record: Value,
    ) -> LoadedDocument {
        if !is_manifest(&record) {
            return LoadedDocument {
                id,
                data: record,
                error: None,
            };
        }
        match self.read_chunked(collection_path, &id, &record).await {
            Ok(document) => LoadedDocument {
                id,
                data: document,
                error: None,
            },
            Err(reason) => {
                warn!(id = %id, %reason, "chunked document failed to load");
                self.metrics.record_chunk_read_failure();
                LoadedDocument {
                    id,
                    data: record,
                    error: Some(reason),
                }
            }
        }
    }

    async fn read_chunked(
        &self,
        collection_path: &ScopePath,
        id: &DocumentId,
        manifest: &Value,
    ) -> Result<Value, String> {
        let chunk_count = manifest_chunk_count(manifest).unwrap_or(0);
        let chunk_scope = collection_path
            .record(id.as_str())
            .and_then(|record| record.scope(CHUNKS_SCOPE))
            .map_err(|e| e.to_string())?;
        let rows = self
            .store
            .query_ordered(&chunk_scope, FIELD_INDEX, Direction::Ascending)
            .await
            .map_err(|e| e.to_string())?;

        let mut chunks = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            let chunk: ChunkRecord = serde_json::from_value(value)
                .map_err(|e| ChunkError::MalformedRecord(e.to_string()).to_string())?;
            chunks.push(chunk);
        }
        reassemble_document(chunks, chunk_count, manifest_total_size(manifest))
            .map_err(|e| e.to_string())
    }

    async fn chunk_ids(&self, chunk_scope: &ScopePath) -> Result<Vec<String>, PersistError> {
        let rows = self
            .store
            .query_ordered(chunk_scope, FIELD_INDEX, Direction::Ascending)
            .await?;
        Ok(rows.into_iter().map(|(id, _)| id.into_string()).collect())
    }
}

// A stale id survives only if it is the canonical rendering of an index the
// new run overwrites; "007" is a different record than "7" and must go.
fn is_live_chunk_id(id: &str, chunk_count: u32) -> bool {
    id.parse::<u32>()
        .is_ok_and(|n| n < chunk_count && n.to_string() == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::SanitizeLimits;
    use serde_json::json;
    use std::time::Duration;
    use venalium_store::MemoryStore;

    fn small_config() -> PersistConfig {
        PersistConfig {
            limits: SanitizeLimits::default(),
            chunk_threshold_bytes: 120,
            chunk_size_chars: 50,
        }
    }

    fn harness() -> (Arc<MemoryStore>, CollectionStore) {
        let store = Arc::new(MemoryStore::new());
        let collections =
            CollectionStore::with_config(store.clone(), small_config()).unwrap();
        (store, collections)
    }

    fn owner_scope() -> Scope {
        Scope::user(OwnerId::new("u1"))
    }

    async fn chunk_ids_at(
        store: &MemoryStore,
        scope: &Scope,
        collection: &str,
        id: &str,
    ) -> Vec<String> {
        let chunk_scope = scope
            .record_path(collection, id)
            .unwrap()
            .scope(CHUNKS_SCOPE)
            .unwrap();
        store
            .query_ordered(&chunk_scope, FIELD_INDEX, Direction::Ascending)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.into_string())
            .collect()
    }

    #[tokio::test]
    async fn test_single_save_stamps_metadata() {
        let (store, collections) = harness();
        let scope = owner_scope();
        let receipt = collections
            .save(
                &scope,
                "drafts",
                json!({"id": "d1", "title": "Notes"}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.outcome, SaveOutcome::Single);
        assert_eq!(receipt.id.as_str(), "d1");

        let record_path = scope.record_path("drafts", "d1").unwrap();
        let stored = store.get_record(&record_path).await.unwrap().unwrap();
        assert_eq!(stored["id"], "d1");
        assert_eq!(stored["chunked"], json!(false));
        assert_eq!(
            stored["updatedAt"].as_u64().unwrap(),
            receipt.updated_at.as_millis()
        );
    }

    #[tokio::test]
    async fn test_save_requires_usable_id() {
        let (_, collections) = harness();
        let scope = owner_scope();
        for doc in [
            json!({"title": "no id"}),
            json!({"id": "", "title": "empty id"}),
            json!({"id": 7, "title": "numeric id"}),
        ] {
            let err = collections
                .save(&scope, "drafts", doc, &SaveOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, PersistError::MissingId));
        }
    }

    #[tokio::test]
    async fn test_save_rejects_non_objects() {
        let (_, collections) = harness();
        let err = collections
            .save_keyed(
                &owner_scope(),
                "maps",
                "currentMap",
                json!("just a string"),
                &SaveOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn test_save_keyed_stamps_key_as_id() {
        let (_, collections) = harness();
        let scope = owner_scope();
        collections
            .save_keyed(
                &scope,
                "maps",
                "currentMap",
                json!({"nodes": [1, 2]}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();

        let item = collections
            .get(&scope, "maps", "currentMap")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.data["id"], "currentMap");
        assert_eq!(item.data["nodes"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_chunked_save_writes_manifest_and_chunks() {
        let (store, collections) = harness();
        let scope = owner_scope();
        let receipt = collections
            .save(
                &scope,
                "maps",
                json!({"id": "m1", "payload": "p".repeat(200)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();

        let SaveOutcome::Chunked {
            chunk_count,
            total_size,
        } = receipt.outcome
        else {
            panic!("expected a chunked save");
        };
        assert_eq!(chunk_count as usize, (total_size as usize).div_ceil(50));

        let manifest = store
            .get_record(&scope.record_path("maps", "m1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest["chunked"], json!(true));
        assert_eq!(manifest["chunkCount"], json!(chunk_count));
        assert_eq!(manifest["totalSize"], json!(total_size));

        let ids = chunk_ids_at(&store, &scope, "maps", "m1").await;
        assert_eq!(ids.len(), chunk_count as usize);
        assert_eq!(ids[0], "0");
    }

    #[tokio::test]
    async fn test_chunked_document_round_trips() {
        let (_, collections) = harness();
        let scope = owner_scope();
        let doc = json!({"id": "m2", "payload": "q".repeat(300), "tag": "big"});
        collections
            .save(&scope, "maps", doc, &SaveOptions::default())
            .await
            .unwrap();

        let items = collections.load(&scope, "maps").await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert!(item.is_intact());
        assert_eq!(item.data["payload"], json!("q".repeat(300)));
        assert_eq!(item.data["tag"], "big");
        // the reassembled document is the pre-manifest form
        assert!(item.data.get("chunkCount").is_none());
    }

    #[tokio::test]
    async fn test_get_reads_both_layouts() {
        let (_, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "drafts",
                json!({"id": "small", "v": 1}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        collections
            .save(
                &scope,
                "drafts",
                json!({"id": "large", "payload": "r".repeat(220)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();

        let small = collections
            .get(&scope, "drafts", "small")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(small.data["v"], 1);

        let large = collections
            .get(&scope, "drafts", "large")
            .await
            .unwrap()
            .unwrap();
        assert!(large.is_intact());
        assert_eq!(large.data["payload"], json!("r".repeat(220)));

        assert!(collections
            .get(&scope, "drafts", "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_load_orders_newest_first() {
        let (_, collections) = harness();
        let scope = owner_scope();
        for id in ["first", "second", "third"] {
            collections
                .save(
                    &scope,
                    "drafts",
                    json!({"id": id}),
                    &SaveOptions::default(),
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let items = collections.load(&scope, "drafts").await.unwrap();
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_shrinking_save_clears_stale_chunks() {
        let (store, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "maps",
                json!({"id": "m3", "payload": "s".repeat(260)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        let before = chunk_ids_at(&store, &scope, "maps", "m3").await;
        assert!(before.len() >= 4);

        let receipt = collections
            .save(
                &scope,
                "maps",
                json!({"id": "m3", "payload": "s".repeat(130)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        let SaveOutcome::Chunked { chunk_count, .. } = receipt.outcome else {
            panic!("expected a chunked save");
        };

        let after = chunk_ids_at(&store, &scope, "maps", "m3").await;
        assert_eq!(after.len(), chunk_count as usize);
        assert!(after.len() < before.len());
        assert_eq!(collections.metrics().stale_chunks_cleared as usize, before.len() - after.len());
    }

    #[tokio::test]
    async fn test_single_save_after_chunked_clears_all_chunks() {
        let (store, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "maps",
                json!({"id": "m4", "payload": "t".repeat(260)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        assert!(!chunk_ids_at(&store, &scope, "maps", "m4").await.is_empty());

        let receipt = collections
            .save(
                &scope,
                "maps",
                json!({"id": "m4", "payload": "tiny"}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.outcome, SaveOutcome::Single);

        assert!(chunk_ids_at(&store, &scope, "maps", "m4").await.is_empty());
        let stored = store
            .get_record(&scope.record_path("maps", "m4").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["chunked"], json!(false));
        assert_eq!(stored["payload"], "tiny");
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_chunks() {
        let (store, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "maps",
                json!({"id": "m5", "payload": "u".repeat(260)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();

        collections.delete(&scope, "maps", "m5").await.unwrap();

        assert!(collections.get(&scope, "maps", "m5").await.unwrap().is_none());
        assert!(chunk_ids_at(&store, &scope, "maps", "m5").await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_noop() {
        let (_, collections) = harness();
        collections
            .delete(&owner_scope(), "maps", "ghost")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bulk_field_left_out_of_manifest() {
        let (store, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "researchGroups",
                json!({"id": "g1", "name": "Group", "papers": ["v".repeat(200)]}),
                &SaveOptions::with_bulk_field("papers"),
            )
            .await
            .unwrap();

        let manifest = store
            .get_record(&scope.record_path("researchGroups", "g1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(manifest.get("papers").is_none());
        assert_eq!(manifest["name"], "Group");

        let item = collections
            .get(&scope, "researchGroups", "g1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.data["papers"], json!(["v".repeat(200)]));
    }

    #[tokio::test]
    async fn test_load_isolates_damaged_documents() {
        let (store, collections) = harness();
        let scope = owner_scope();
        for id in ["ok1", "bad", "ok2"] {
            collections
                .save(
                    &scope,
                    "maps",
                    json!({"id": id, "payload": "w".repeat(200)}),
                    &SaveOptions::default(),
                )
                .await
                .unwrap();
        }

        // damage one document by removing a middle chunk
        let lost = scope
            .record_path("maps", "bad")
            .unwrap()
            .scope(CHUNKS_SCOPE)
            .unwrap()
            .record("1")
            .unwrap();
        store.batch_write(vec![WriteOp::delete(lost)]).await.unwrap();

        let items = collections.load(&scope, "maps").await.unwrap();
        assert_eq!(items.len(), 3);

        let failed: Vec<&LoadedDocument> =
            items.iter().filter(|item| !item.is_intact()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id.as_str(), "bad");
        // the broken item still carries its manifest fields
        assert_eq!(failed[0].data["chunked"], json!(true));
        assert!(failed[0].error.as_ref().unwrap().contains("chunks"));

        for item in items.iter().filter(|item| item.is_intact()) {
            assert_eq!(item.data["payload"], json!("w".repeat(200)));
        }
        assert_eq!(collections.metrics().chunk_read_failures, 1);
    }

    #[tokio::test]
    async fn test_metrics_cover_save_paths() {
        let (_, collections) = harness();
        let scope = owner_scope();
        collections
            .save(
                &scope,
                "drafts",
                json!({"id": "a"}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        collections
            .save(
                &scope,
                "drafts",
                json!({"id": "b", "payload": "x".repeat(200)}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        collections.load(&scope, "drafts").await.unwrap();
        collections.delete(&scope, "drafts", "a").await.unwrap();

        let snap = collections.metrics();
        assert_eq!(snap.saves_single, 1);
        assert_eq!(snap.saves_chunked, 1);
        assert!(snap.chunk_records_written >= 4);
        assert_eq!(snap.documents_loaded, 2);
        assert_eq!(snap.deletes, 1);
    }
}
