//! The async document store abstraction.

use crate::error::StoreError;
use crate::path::{RecordPath, ScopePath};
use crate::types::{Direction, DocumentId};
use async_trait::async_trait;
use serde_json::Value;

/// One mutation inside an atomic [`DocumentStore::batch_write`] batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Write `data` at `path`, replacing the record or merging its
    /// top-level fields.
    Set {
        /// Record to write.
        path: RecordPath,
        /// New record value.
        data: Value,
        /// Overlay top-level fields instead of replacing the record.
        merge: bool,
    },
    /// Remove the record at `path`. Removing a missing record is not an
    /// error.
    Delete {
        /// Record to remove.
        path: RecordPath,
    },
}

impl WriteOp {
    /// Full-record write.
    pub fn set(path: RecordPath, data: Value) -> Self {
        Self::Set {
            path,
            data,
            merge: false,
        }
    }

    /// Top-level field merge into an existing record.
    pub fn merge(path: RecordPath, data: Value) -> Self {
        Self::Set {
            path,
            data,
            merge: true,
        }
    }

    /// Record removal.
    pub fn delete(path: RecordPath) -> Self {
        Self::Delete { path }
    }
}

/// Backend-agnostic JSON document store.
///
/// The persistence layer only ever touches a backend through these four
/// operations; sanitizing, chunking, and manifests are all built on top.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one record, `None` when absent.
    async fn get_record(&self, path: &RecordPath) -> Result<Option<Value>, StoreError>;

    /// Writes one record. With `merge` set, top-level fields of `data`
    /// overlay the existing record instead of replacing it; merging into a
    /// missing record creates it.
    async fn set_record(&self, path: &RecordPath, data: Value, merge: bool)
        -> Result<(), StoreError>;

    /// Applies every operation or none of them. Operations apply in
    /// submission order, so a set following a delete of the same path
    /// leaves the set in place.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Lists the direct child records of `scope` ordered by `order_field`.
    ///
    /// Records nested in deeper sub-collections are not included. Records
    /// missing the order field sort after all records that have it,
    /// regardless of direction.
    async fn query_ordered(
        &self,
        scope: &ScopePath,
        order_field: &str,
        direction: Direction,
    ) -> Result<Vec<(DocumentId, Value)>, StoreError>;
}
