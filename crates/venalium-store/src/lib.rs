#![warn(missing_docs)]
//! Venalium document store.
//!
//! Path-addressed JSON document storage behind the async [`DocumentStore`]
//! trait: point reads, merge-aware writes, atomic multi-record batches, and
//! ordered collection queries. [`MemoryStore`] is the in-process backend the
//! persistence layer uses for tests and local tooling; production backends
//! implement the same four operations.

pub mod error;
pub mod memory;
pub mod path;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::{RecordPath, ScopePath};
pub use store::{DocumentStore, WriteOp};
pub use types::{Direction, DocumentId, OwnerId, ProjectId, Timestamp};
