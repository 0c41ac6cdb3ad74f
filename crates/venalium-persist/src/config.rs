//! Pipeline configuration.

use crate::chunk::{CHUNK_SIZE_CHARS, CHUNK_THRESHOLD_BYTES};
use crate::error::PersistError;
use crate::sanitize::SanitizeLimits;
use serde::{Deserialize, Serialize};

/// Tunables for the persistence pipeline.
///
/// Defaults mirror production: documents over 900 kB of serialized JSON are
/// stored as 500,000-character chunk records, and sanitizer limits bound
/// depth, array length, and string length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Sanitizer bounds applied to every document before serialization.
    pub limits: SanitizeLimits,
    /// Serialized byte length above which a save is stored chunked.
    pub chunk_threshold_bytes: usize,
    /// Characters of serialized text per chunk record.
    pub chunk_size_chars: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            limits: SanitizeLimits::default(),
            chunk_threshold_bytes: CHUNK_THRESHOLD_BYTES,
            chunk_size_chars: CHUNK_SIZE_CHARS,
        }
    }
}

impl PersistConfig {
    /// Rejects configurations that cannot round-trip documents.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.chunk_threshold_bytes == 0 {
            return Err(PersistError::Config(
                "chunk_threshold_bytes must be positive".into(),
            ));
        }
        if self.chunk_size_chars == 0 {
            return Err(PersistError::Config(
                "chunk_size_chars must be positive".into(),
            ));
        }
        self.limits.validate()
    }
}
