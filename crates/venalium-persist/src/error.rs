//! Persistence pipeline error types.

use thiserror::Error;
use venalium_store::StoreError;

/// Errors from the persistence pipeline.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The document lacked the non-empty string `id` field saves require.
    #[error("document has no usable id field")]
    MissingId,

    /// The value handed to save was not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The sanitized document failed to serialize.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The underlying store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rejected configuration.
    #[error("config: {0}")]
    Config(String),
}
