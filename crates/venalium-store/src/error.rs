//! Store error types.

use thiserror::Error;

/// Errors surfaced by [`DocumentStore`](crate::DocumentStore) implementations
/// and by path construction.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A path segment or segment count violated the path model.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The backend rejected or failed an operation.
    #[error("store backend: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded by the backend.
    #[error("store serialization: {0}")]
    Serialization(String),
}
