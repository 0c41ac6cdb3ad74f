//! End-to-end scenarios for the persistence pipeline over the in-memory
//! store: threshold edges, the multi-megabyte chunking scenario, retrieval
//! order independence, per-document failure isolation, and representation
//! migration.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use venalium_persist::{
    CollectionStore, PersistConfig, SaveOptions, SaveOutcome, Scope, CHUNKS_SCOPE,
};
use venalium_store::{
    Direction, DocumentId, DocumentStore, MemoryStore, OwnerId, RecordPath, ScopePath, StoreError,
    WriteOp,
};

/// A store that hands chunk queries back in reversed order, mimicking a
/// backend with no stable retrieval order. Reconstruction must not care.
pub struct OutOfOrderStore {
    inner: MemoryStore,
}

impl OutOfOrderStore {
    /// Wraps a fresh in-memory store.
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

impl Default for OutOfOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for OutOfOrderStore {
    async fn get_record(&self, path: &RecordPath) -> Result<Option<Value>, StoreError> {
        self.inner.get_record(path).await
    }

    async fn set_record(
        &self,
        path: &RecordPath,
        data: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.inner.set_record(path, data, merge).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.inner.batch_write(ops).await
    }

    async fn query_ordered(
        &self,
        scope: &ScopePath,
        order_field: &str,
        direction: Direction,
    ) -> Result<Vec<(DocumentId, Value)>, StoreError> {
        let mut rows = self.inner.query_ordered(scope, order_field, direction).await?;
        if order_field == "index" {
            rows.reverse();
        }
        Ok(rows)
    }
}

/// Padding characters that make the stored serialization of `shape` exactly
/// `target_bytes` long. `shape` must already carry the pad field as an empty
/// string; the pad itself must serialize one byte per character.
fn padding_for(shape: &Value, target_bytes: usize) -> usize {
    let mut probe = shape.clone();
    // updatedAt is stamped at save time; 13 digits until the year 2286
    probe["updatedAt"] = Value::from(1_700_000_000_000u64);
    let fixed = serde_json::to_string(&probe).expect("probe serializes").len();
    target_bytes
        .checked_sub(fixed)
        .expect("shape larger than the target size")
}

fn tight_config() -> PersistConfig {
    PersistConfig {
        chunk_threshold_bytes: 150,
        chunk_size_chars: 40,
        ..Default::default()
    }
}

fn tight_harness() -> (Arc<MemoryStore>, CollectionStore) {
    let store = Arc::new(MemoryStore::new());
    let collections = CollectionStore::with_config(store.clone(), tight_config())
        .expect("tight config is valid");
    (store, collections)
}

fn scope() -> Scope {
    Scope::user(OwnerId::new("owner-1"))
}

async fn chunk_rows(
    store: &dyn DocumentStore,
    scope: &Scope,
    collection: &str,
    id: &str,
) -> Vec<(DocumentId, Value)> {
    let chunks = scope
        .record_path(collection, id)
        .unwrap()
        .scope(CHUNKS_SCOPE)
        .unwrap();
    store
        .query_ordered(&chunks, "index", Direction::Ascending)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_clean_document_round_trips() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let collections = CollectionStore::new(store);
    let scope = scope();

    let doc = json!({
        "id": "note-1",
        "title": "Reading list",
        "tags": ["storage", "chunks"],
        "meta": {"pinned": true, "rank": 3}
    });
    let receipt = collections
        .save(&scope, "notes", doc.clone(), &SaveOptions::default())
        .await?;
    assert_eq!(receipt.outcome, SaveOutcome::Single);

    let items = collections.load(&scope, "notes").await?;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert!(item.is_intact());
    assert_eq!(item.data["title"], doc["title"]);
    assert_eq!(item.data["tags"], doc["tags"]);
    assert_eq!(item.data["meta"], doc["meta"]);
    assert_eq!(item.data["chunked"], json!(false));
    assert_eq!(
        item.data["updatedAt"].as_u64().unwrap(),
        receipt.updated_at.as_millis()
    );
    Ok(())
}

#[tokio::test]
async fn test_exact_threshold_stays_single() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let collections = CollectionStore::new(store.clone());
    let scope = scope();

    let shape = json!({"data": "", "id": "edge"});
    let pad = padding_for(&shape, 900_000);
    let receipt = collections
        .save(
            &scope,
            "drafts",
            json!({"id": "edge", "data": "e".repeat(pad)}),
            &SaveOptions::default(),
        )
        .await?;

    assert_eq!(receipt.outcome, SaveOutcome::Single);
    assert!(chunk_rows(store.as_ref(), &scope, "drafts", "edge")
        .await
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_one_byte_over_threshold_chunks() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let collections = CollectionStore::new(store.clone());
    let scope = scope();

    let shape = json!({"data": "", "id": "edge"});
    let pad = padding_for(&shape, 900_001);
    let receipt = collections
        .save(
            &scope,
            "drafts",
            json!({"id": "edge", "data": "e".repeat(pad)}),
            &SaveOptions::default(),
        )
        .await?;

    assert_eq!(
        receipt.outcome,
        SaveOutcome::Chunked {
            chunk_count: 2,
            total_size: 900_001
        }
    );
    assert_eq!(chunk_rows(store.as_ref(), &scope, "drafts", "edge").await.len(), 2);
    Ok(())
}

/// The headline scenario: a document whose sanitized serialization is
/// exactly two million bytes lands as four full chunks plus a manifest, and
/// loads back with its over-long array cut to the first five thousand
/// elements.
#[tokio::test]
async fn test_two_megabyte_document_scenario() -> anyhow::Result<()> {
    crate::init_logging();
    let store = Arc::new(MemoryStore::new());
    let collections = CollectionStore::new(store.clone());
    let scope = scope();

    let kept_items: Vec<u64> = (0..5_000).collect();
    let shape = json!({
        "bulk": ["x".repeat(600_000), "y".repeat(600_000), ""],
        "id": "atlas",
        "items": kept_items,
    });
    let pad = padding_for(&shape, 2_000_000);

    let doc = json!({
        "id": "atlas",
        "items": (0..10_000u64).collect::<Vec<u64>>(),
        "bulk": ["x".repeat(600_000), "y".repeat(600_000), "z".repeat(pad)],
    });
    let receipt = collections
        .save(&scope, "maps", doc, &SaveOptions::default())
        .await?;
    assert_eq!(
        receipt.outcome,
        SaveOutcome::Chunked {
            chunk_count: 4,
            total_size: 2_000_000
        }
    );

    let manifest = store
        .get_record(&scope.record_path("maps", "atlas")?)
        .await?
        .expect("manifest stored");
    assert_eq!(manifest["chunked"], json!(true));
    assert_eq!(manifest["chunkCount"], json!(4));
    assert_eq!(manifest["totalSize"], json!(2_000_000));

    let rows = chunk_rows(store.as_ref(), &scope, "maps", "atlas").await;
    assert_eq!(rows.len(), 4);
    for (position, (id, record)) in rows.iter().enumerate() {
        assert_eq!(id.as_str(), position.to_string());
        assert_eq!(record["index"], json!(position));
        assert_eq!(record["data"].as_str().unwrap().len(), 500_000);
    }

    let items = collections.load(&scope, "maps").await?;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert!(item.is_intact());
    assert_eq!(item.data["items"], json!((0..5_000u64).collect::<Vec<u64>>()));
    assert_eq!(item.data["bulk"][0].as_str().unwrap().len(), 600_000);
    assert_eq!(item.data["bulk"][2].as_str().unwrap().len(), pad);
    Ok(())
}

#[tokio::test]
async fn test_reconstruction_survives_out_of_order_retrieval() -> anyhow::Result<()> {
    let store = Arc::new(OutOfOrderStore::new());
    let collections = CollectionStore::with_config(store, tight_config())?;
    let scope = scope();

    let payload = "0123456789".repeat(40);
    collections
        .save(
            &scope,
            "maps",
            json!({"id": "m1", "payload": payload}),
            &SaveOptions::default(),
        )
        .await?;

    let item = collections
        .get(&scope, "maps", "m1")
        .await?
        .expect("document present");
    assert!(item.is_intact());
    assert_eq!(item.data["payload"], json!("0123456789".repeat(40)));
    Ok(())
}

#[tokio::test]
async fn test_missing_chunk_isolates_one_document() -> anyhow::Result<()> {
    let (store, collections) = tight_harness();
    let scope = scope();

    for id in ["alpha", "beta", "gamma"] {
        collections
            .save(
                &scope,
                "maps",
                json!({"id": id, "payload": format!("{id}-").repeat(60)}),
                &SaveOptions::default(),
            )
            .await?;
    }

    let lost = scope
        .record_path("maps", "beta")?
        .scope(CHUNKS_SCOPE)?
        .record("1")?;
    store.batch_write(vec![WriteOp::delete(lost)]).await?;

    let items = collections.load(&scope, "maps").await?;
    assert_eq!(items.len(), 3);
    let broken: Vec<_> = items.iter().filter(|item| !item.is_intact()).collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].id.as_str(), "beta");
    assert_eq!(broken[0].data["chunked"], json!(true));
    for item in items.iter().filter(|item| item.is_intact()) {
        let id = item.id.as_str();
        assert_eq!(item.data["payload"], json!(format!("{id}-").repeat(60)));
    }
    Ok(())
}

#[tokio::test]
async fn test_delete_leaves_no_manifest_or_chunks() -> anyhow::Result<()> {
    let (store, collections) = tight_harness();
    let scope = scope();

    collections
        .save(
            &scope,
            "maps",
            json!({"id": "gone", "payload": "g".repeat(400)}),
            &SaveOptions::default(),
        )
        .await?;
    assert!(!chunk_rows(store.as_ref(), &scope, "maps", "gone").await.is_empty());

    collections.delete(&scope, "maps", "gone").await?;

    assert!(collections.load(&scope, "maps").await?.is_empty());
    assert!(chunk_rows(store.as_ref(), &scope, "maps", "gone").await.is_empty());
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_migration_shrinks_and_unchunks_cleanly() -> anyhow::Result<()> {
    let (store, collections) = tight_harness();
    let scope = scope();

    collections
        .save(
            &scope,
            "maps",
            json!({"id": "m2", "payload": "a".repeat(500)}),
            &SaveOptions::default(),
        )
        .await?;
    let wide = chunk_rows(store.as_ref(), &scope, "maps", "m2").await.len();
    assert!(wide > 4);

    // fewer chunks: everything past the new run must be gone
    let receipt = collections
        .save(
            &scope,
            "maps",
            json!({"id": "m2", "payload": "b".repeat(180)}),
            &SaveOptions::default(),
        )
        .await?;
    let SaveOutcome::Chunked { chunk_count, .. } = receipt.outcome else {
        panic!("expected a chunked save");
    };
    assert_eq!(
        chunk_rows(store.as_ref(), &scope, "maps", "m2").await.len(),
        chunk_count as usize
    );

    // back under the threshold: no chunks at all
    let receipt = collections
        .save(
            &scope,
            "maps",
            json!({"id": "m2", "payload": "small"}),
            &SaveOptions::default(),
        )
        .await?;
    assert_eq!(receipt.outcome, SaveOutcome::Single);
    assert!(chunk_rows(store.as_ref(), &scope, "maps", "m2").await.is_empty());

    let item = collections.get(&scope, "maps", "m2").await?.unwrap();
    assert_eq!(item.data["payload"], json!("small"));
    Ok(())
}

#[tokio::test]
async fn test_current_map_singleton_chunks_under_its_key() -> anyhow::Result<()> {
    let (store, collections) = tight_harness();
    let scope = scope();

    let nodes: Vec<Value> = (0..30)
        .map(|n| json!({"label": format!("node {n}"), "x": n, "y": n * 2}))
        .collect();
    collections
        .save_keyed(
            &scope,
            "maps",
            "currentMap",
            json!({"nodes": nodes, "title": "Working map"}),
            &SaveOptions::with_bulk_field("nodes"),
        )
        .await?;

    let manifest = store
        .get_record(&scope.record_path("maps", "currentMap")?)
        .await?
        .expect("manifest stored");
    assert_eq!(manifest["chunked"], json!(true));
    assert_eq!(manifest["title"], "Working map");
    assert!(manifest.get("nodes").is_none());

    let item = collections
        .get(&scope, "maps", "currentMap")
        .await?
        .expect("document present");
    assert!(item.is_intact());
    assert_eq!(item.data["id"], "currentMap");
    assert_eq!(item.data["nodes"].as_array().unwrap().len(), 30);
    assert_eq!(item.data["nodes"][7]["label"], "node 7");
    Ok(())
}

#[tokio::test]
async fn test_random_payload_round_trips() -> anyhow::Result<()> {
    use rand::distributions::Alphanumeric;
    use rand::{Rng, SeedableRng};

    let (_, collections) = tight_harness();
    let scope = scope();

    let payload: String = rand::rngs::StdRng::seed_from_u64(7)
        .sample_iter(&Alphanumeric)
        .take(1_200)
        .map(char::from)
        .collect();
    let receipt = collections
        .save(
            &scope,
            "drafts",
            json!({"id": "rng", "payload": payload.clone()}),
            &SaveOptions::default(),
        )
        .await?;
    assert!(matches!(receipt.outcome, SaveOutcome::Chunked { .. }));

    let item = collections.get(&scope, "drafts", "rng").await?.unwrap();
    assert_eq!(item.data["payload"], json!(payload));
    Ok(())
}
