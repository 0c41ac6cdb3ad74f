//! In-memory [`DocumentStore`] backed by a sorted map.

use crate::error::StoreError;
use crate::path::{RecordPath, ScopePath};
use crate::store::{DocumentStore, WriteOp};
use crate::types::{Direction, DocumentId};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory store keyed by rendered record paths.
///
/// Batches apply under a single write lock, giving readers the same
/// all-or-nothing visibility the trait promises from real backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().map(|map| map.len()).unwrap_or(0)
    }

    /// True when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(map: &mut BTreeMap<String, Value>, op: WriteOp) {
        match op {
            WriteOp::Set { path, data, merge } => {
                let key = path.to_string();
                match (merge, data) {
                    (true, Value::Object(incoming)) => match map.get_mut(&key) {
                        Some(Value::Object(existing)) => {
                            for (field, value) in incoming {
                                existing.insert(field, value);
                            }
                        }
                        _ => {
                            map.insert(key, Value::Object(incoming));
                        }
                    },
                    (_, data) => {
                        map.insert(key, data);
                    }
                }
            }
            WriteOp::Delete { path } => {
                map.remove(&path.to_string());
            }
        }
    }
}

/// Ordering key extracted from a record's order field.
enum OrderKey<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool),
    Missing,
}

impl OrderKey<'_> {
    fn is_missing(&self) -> bool {
        matches!(self, OrderKey::Missing)
    }

    fn compare(&self, other: &Self) -> CmpOrdering {
        match (self, other) {
            (OrderKey::Number(a), OrderKey::Number(b)) => a.total_cmp(b),
            (OrderKey::Text(a), OrderKey::Text(b)) => a.cmp(b),
            (OrderKey::Bool(a), OrderKey::Bool(b)) => a.cmp(b),
            // mixed types: booleans, then numbers, then text
            (OrderKey::Bool(_), _) => CmpOrdering::Less,
            (_, OrderKey::Bool(_)) => CmpOrdering::Greater,
            (OrderKey::Number(_), _) => CmpOrdering::Less,
            (_, OrderKey::Number(_)) => CmpOrdering::Greater,
            _ => CmpOrdering::Equal,
        }
    }
}

fn order_key<'a>(record: &'a Value, field: &str) -> OrderKey<'a> {
    match record.get(field) {
        Some(Value::Number(n)) => OrderKey::Number(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => OrderKey::Text(s),
        Some(Value::Bool(b)) => OrderKey::Bool(*b),
        _ => OrderKey::Missing,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_record(&self, path: &RecordPath) -> Result<Option<Value>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(records.get(&path.to_string()).cloned())
    }

    async fn set_record(
        &self,
        path: &RecordPath,
        data: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::apply(
            &mut records,
            WriteOp::Set {
                path: path.clone(),
                data,
                merge,
            },
        );
        Ok(())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for op in ops {
            Self::apply(&mut records, op);
        }
        Ok(())
    }

    async fn query_ordered(
        &self,
        scope: &ScopePath,
        order_field: &str,
        direction: Direction,
    ) -> Result<Vec<(DocumentId, Value)>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let prefix = format!("{scope}/");
        let mut rows: Vec<(DocumentId, Value)> = Vec::new();
        for (key, value) in records.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            // records of nested sub-collections are not direct children
            if rest.contains('/') {
                continue;
            }
            rows.push((DocumentId::new(rest), value.clone()));
        }
        rows.sort_by(|a, b| {
            let ka = order_key(&a.1, order_field);
            let kb = order_key(&b.1, order_field);
            match (ka.is_missing(), kb.is_missing()) {
                (true, true) => CmpOrdering::Equal,
                (true, false) => CmpOrdering::Greater,
                (false, true) => CmpOrdering::Less,
                (false, false) => {
                    let ordering = ka.compare(&kb);
                    match direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                }
            }
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(segments: &[&str]) -> RecordPath {
        RecordPath::new(segments.iter().copied()).unwrap()
    }

    fn scope(segments: &[&str]) -> ScopePath {
        ScopePath::new(segments.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "drafts", "d1"]);
        store
            .set_record(&path, json!({"id": "d1", "title": "Draft"}), false)
            .await
            .unwrap();
        let loaded = store.get_record(&path).await.unwrap().unwrap();
        assert_eq!(loaded["title"], "Draft");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "drafts", "nope"]);
        assert!(store.get_record(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_record() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "drafts", "d1"]);
        store
            .set_record(&path, json!({"a": 1, "b": 2}), false)
            .await
            .unwrap();
        store.set_record(&path, json!({"a": 3}), false).await.unwrap();
        let loaded = store.get_record(&path).await.unwrap().unwrap();
        assert_eq!(loaded, json!({"a": 3}));
    }

    #[tokio::test]
    async fn test_merge_overlays_top_level_fields() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "projects", "p1"]);
        store
            .set_record(&path, json!({"name": "Study", "year": 2024}), false)
            .await
            .unwrap();
        store
            .set_record(&path, json!({"driveFolderId": "f-1"}), true)
            .await
            .unwrap();
        let loaded = store.get_record(&path).await.unwrap().unwrap();
        assert_eq!(
            loaded,
            json!({"name": "Study", "year": 2024, "driveFolderId": "f-1"})
        );
    }

    #[tokio::test]
    async fn test_merge_creates_missing_record() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "projects", "p1"]);
        store
            .set_record(&path, json!({"driveFolderId": "f-1"}), true)
            .await
            .unwrap();
        let loaded = store.get_record(&path).await.unwrap().unwrap();
        assert_eq!(loaded, json!({"driveFolderId": "f-1"}));
    }

    #[tokio::test]
    async fn test_batch_applies_all_ops() {
        let store = MemoryStore::new();
        let a = record(&["users", "u1", "maps", "a"]);
        let b = record(&["users", "u1", "maps", "b"]);
        store.set_record(&a, json!({"v": 1}), false).await.unwrap();

        store
            .batch_write(vec![
                WriteOp::delete(a.clone()),
                WriteOp::set(b.clone(), json!({"v": 2})),
            ])
            .await
            .unwrap();

        assert!(store.get_record(&a).await.unwrap().is_none());
        assert_eq!(store.get_record(&b).await.unwrap().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_batch_delete_then_set_same_path() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "maps", "m1"]);
        store.set_record(&path, json!({"v": 1}), false).await.unwrap();

        store
            .batch_write(vec![
                WriteOp::delete(path.clone()),
                WriteOp::set(path.clone(), json!({"v": 2})),
            ])
            .await
            .unwrap();

        assert_eq!(store.get_record(&path).await.unwrap().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryStore::new();
        let path = record(&["users", "u1", "maps", "ghost"]);
        store
            .batch_write(vec![WriteOp::delete(path)])
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_lists_only_direct_children() {
        let store = MemoryStore::new();
        store
            .set_record(
                &record(&["users", "u1", "maps", "m1"]),
                json!({"updatedAt": 2}),
                false,
            )
            .await
            .unwrap();
        store
            .set_record(
                &record(&["users", "u1", "maps", "m1", "chunks", "0"]),
                json!({"index": 0}),
                false,
            )
            .await
            .unwrap();
        store
            .set_record(
                &record(&["users", "u1", "mapsarchive", "x"]),
                json!({"updatedAt": 9}),
                false,
            )
            .await
            .unwrap();

        let rows = store
            .query_ordered(
                &scope(&["users", "u1", "maps"]),
                "updatedAt",
                Direction::Descending,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.as_str(), "m1");
    }

    #[tokio::test]
    async fn test_query_orders_numeric_field() {
        let store = MemoryStore::new();
        for (id, at) in [("a", 10), ("b", 30), ("c", 20)] {
            store
                .set_record(
                    &record(&["users", "u1", "drafts", id]),
                    json!({"updatedAt": at}),
                    false,
                )
                .await
                .unwrap();
        }

        let rows = store
            .query_ordered(
                &scope(&["users", "u1", "drafts"]),
                "updatedAt",
                Direction::Descending,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let rows = store
            .query_ordered(
                &scope(&["users", "u1", "drafts"]),
                "updatedAt",
                Direction::Ascending,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_query_missing_field_sorts_last() {
        let store = MemoryStore::new();
        store
            .set_record(
                &record(&["users", "u1", "drafts", "with"]),
                json!({"updatedAt": 5}),
                false,
            )
            .await
            .unwrap();
        store
            .set_record(
                &record(&["users", "u1", "drafts", "without"]),
                json!({"title": "no stamp"}),
                false,
            )
            .await
            .unwrap();

        for direction in [Direction::Ascending, Direction::Descending] {
            let rows = store
                .query_ordered(&scope(&["users", "u1", "drafts"]), "updatedAt", direction)
                .await
                .unwrap();
            assert_eq!(rows.last().unwrap().0.as_str(), "without");
        }
    }
}
