#![warn(missing_docs)]
//! Venalium persistence pipeline.
//!
//! Stores arbitrarily large JSON documents in a backend whose per-record
//! size is capped. Every save runs through the same pipeline: the document
//! is sanitized against runaway sizes, stamped, serialized, and classified
//! by byte length; small documents land in one record while large ones are
//! split into fixed-size chunk records addressed by a manifest. Reads
//! reassemble transparently, and a document whose chunks are damaged is
//! reported per item instead of failing the whole collection.
//!
//! [`CollectionStore`] is the entry point; it works over any
//! [`DocumentStore`](venalium_store::DocumentStore) backend.

pub mod chunk;
pub mod collection;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sanitize;

pub use chunk::{ChunkError, ChunkRecord, CHUNKS_SCOPE, CHUNK_SIZE_CHARS, CHUNK_THRESHOLD_BYTES};
pub use collection::{
    CollectionStore, LoadedDocument, SaveOptions, SaveOutcome, SaveReceipt, Scope,
};
pub use config::PersistConfig;
pub use error::PersistError;
pub use metrics::{MetricsSnapshot, PersistMetrics};
pub use sanitize::{sanitize, SanitizeLimits, SanitizeStats};
