//! Splitting oversized serialized documents into indexed chunk records and
//! reassembling them on read.
//!
//! A chunked document is stored as a manifest at the record's own path plus
//! `ceil(serialized_length / chunk_size)` chunk records in the `chunks`
//! sub-collection, keyed `"0"`, `"1"`, ... Each chunk carries its slice of
//! the serialized text and its position, so reassembly never trusts the
//! store's retrieval order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Serialized byte length above which a document is stored chunked.
/// Exactly this many bytes still fits in a single record.
pub const CHUNK_THRESHOLD_BYTES: usize = 900_000;

/// Characters of serialized text per chunk record.
pub const CHUNK_SIZE_CHARS: usize = 500_000;

/// Sub-collection under a record that holds its chunk records.
pub const CHUNKS_SCOPE: &str = "chunks";

/// Manifest field marking a record as chunked.
pub const FIELD_CHUNKED: &str = "chunked";
/// Manifest field holding the number of chunk records.
pub const FIELD_CHUNK_COUNT: &str = "chunkCount";
/// Manifest field holding the serialized byte length.
pub const FIELD_TOTAL_SIZE: &str = "totalSize";
/// Chunk-record field holding the slice position.
pub const FIELD_INDEX: &str = "index";
/// Record field stamped with the save timestamp.
pub const FIELD_UPDATED_AT: &str = "updatedAt";
/// Record field holding the document id.
pub const FIELD_ID: &str = "id";

/// True when a document of `serialized_bytes` must be stored chunked.
pub fn needs_chunking(serialized_bytes: usize, threshold_bytes: usize) -> bool {
    serialized_bytes > threshold_bytes
}

/// One stored slice of a serialized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Slice of the serialized document text.
    pub data: String,
    /// Zero-based position of this slice.
    pub index: u32,
}

/// Cuts `serialized` into successive `chunk_size_chars`-character records.
///
/// Slicing is by character so every chunk stays valid UTF-8; the final chunk
/// carries the remainder. Empty input yields no chunks.
pub fn split_chunks(serialized: &str, chunk_size_chars: usize) -> Vec<ChunkRecord> {
    if serialized.is_empty() || chunk_size_chars == 0 {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut rest = serialized;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(chunk_size_chars)
            .map(|(at, _)| at)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(cut);
        chunks.push(ChunkRecord {
            data: head.to_string(),
            index: chunks.len() as u32,
        });
        rest = tail;
    }
    chunks
}

/// Why a set of chunk records failed to reassemble.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// Fewer or more chunk records than the manifest advertised.
    #[error("manifest lists {expected} chunks, store returned {found}")]
    CountMismatch {
        /// Count recorded in the manifest.
        expected: u32,
        /// Chunk records actually retrieved.
        found: u32,
    },

    /// After sorting, chunk indexes were not the contiguous run `0..count`.
    #[error("chunk run broken at position {position}: found index {found}")]
    NonContiguous {
        /// Position in the sorted run where the break appeared.
        position: u32,
        /// Index actually found there.
        found: u32,
    },

    /// Reassembled byte length disagrees with the manifest's total size.
    #[error("reassembled {actual} bytes, manifest recorded {expected}")]
    SizeMismatch {
        /// Byte length the manifest recorded.
        expected: u64,
        /// Byte length actually reassembled.
        actual: u64,
    },

    /// Reassembled text is not valid JSON.
    #[error("chunk payload is not valid JSON: {0}")]
    Parse(String),

    /// A chunk record was missing its data or index field.
    #[error("malformed chunk record: {0}")]
    MalformedRecord(String),
}

/// Joins chunk records back into the serialized document text.
///
/// Records may arrive in any order; they are sorted by index here and the
/// sorted run must be exactly `0..expected_count`.
pub fn assemble_chunks(
    mut chunks: Vec<ChunkRecord>,
    expected_count: u32,
) -> Result<String, ChunkError> {
    if chunks.len() as u32 != expected_count {
        return Err(ChunkError::CountMismatch {
            expected: expected_count,
            found: chunks.len() as u32,
        });
    }
    chunks.sort_by_key(|chunk| chunk.index);
    let mut text = String::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index != position as u32 {
            return Err(ChunkError::NonContiguous {
                position: position as u32,
                found: chunk.index,
            });
        }
        text.push_str(&chunk.data);
    }
    Ok(text)
}

/// Reassembles and parses a chunked document, verifying the byte length
/// when the manifest recorded one.
pub fn reassemble_document(
    chunks: Vec<ChunkRecord>,
    expected_count: u32,
    expected_bytes: Option<u64>,
) -> Result<Value, ChunkError> {
    let text = assemble_chunks(chunks, expected_count)?;
    if let Some(expected) = expected_bytes {
        let actual = text.len() as u64;
        if actual != expected {
            return Err(ChunkError::SizeMismatch { expected, actual });
        }
    }
    serde_json::from_str(&text).map_err(|e| ChunkError::Parse(e.to_string()))
}

/// Builds the manifest stored at a chunked document's own path: every
/// top-level field except the designated bulk field, plus the chunk markers.
///
/// The `chunked`, `chunkCount`, and `totalSize` names are reserved; caller
/// fields with those names are overwritten.
pub fn manifest_record(
    document: &Value,
    chunk_count: u32,
    total_bytes: u64,
    bulk_field: Option<&str>,
) -> Value {
    let mut fields = match document {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(bulk) = bulk_field {
        fields.remove(bulk);
    }
    fields.insert(FIELD_CHUNKED.to_string(), Value::Bool(true));
    fields.insert(FIELD_CHUNK_COUNT.to_string(), Value::from(chunk_count));
    fields.insert(FIELD_TOTAL_SIZE.to_string(), Value::from(total_bytes));
    Value::Object(fields)
}

/// True when a stored record is a chunk manifest rather than a document.
///
/// Both the flag and a positive chunk count are required, so records that
/// merely carry a `chunked` field are not misread.
pub fn is_manifest(record: &Value) -> bool {
    record
        .get(FIELD_CHUNKED)
        .and_then(Value::as_bool)
        .unwrap_or(false)
        && manifest_chunk_count(record).is_some_and(|count| count > 0)
}

/// Chunk count recorded in a manifest.
pub fn manifest_chunk_count(record: &Value) -> Option<u32> {
    record
        .get(FIELD_CHUNK_COUNT)
        .and_then(Value::as_u64)
        .and_then(|count| u32::try_from(count).ok())
}

/// Serialized byte length recorded in a manifest.
pub fn manifest_total_size(record: &Value) -> Option<u64> {
    record.get(FIELD_TOTAL_SIZE).and_then(Value::as_u64)
}
