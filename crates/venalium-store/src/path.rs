//! Slash-joined segment paths addressing collections and records.
//!
//! Paths alternate collection and record segments, Firestore style:
//! `users/{owner}/drafts` names a collection, `users/{owner}/drafts/{id}`
//! names one record inside it, and a record can nest further collections
//! (`users/{owner}/drafts/{id}/chunks`). A [`ScopePath`] always has an odd
//! number of segments, a [`RecordPath`] an even number; constructors reject
//! anything else, so a validly typed path is always addressable.

use crate::error::StoreError;
use std::fmt;

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath("empty path segment".into()));
    }
    if segment.contains('/') {
        return Err(StoreError::InvalidPath(format!(
            "segment contains '/': {segment}"
        )));
    }
    Ok(())
}

/// Path to a collection of records (odd segment count).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopePath {
    segments: Vec<String>,
}

impl ScopePath {
    /// Builds a scope path, validating segment shape and count.
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "scope paths need an odd segment count, got {}",
                segments.len()
            )));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Path of the record `id` inside this collection.
    pub fn record(&self, id: &str) -> Result<RecordPath, StoreError> {
        validate_segment(id)?;
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Ok(RecordPath { segments })
    }

    /// The collection name (final segment).
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Raw segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Path to a single record (even segment count).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPath {
    segments: Vec<String>,
}

impl RecordPath {
    /// Builds a record path, validating segment shape and count.
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "record paths need an even segment count, got {}",
                segments.len()
            )));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Record id (final segment).
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The collection this record belongs to.
    pub fn parent(&self) -> ScopePath {
        ScopePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Path of the sub-collection `name` nested under this record.
    pub fn scope(&self, name: &str) -> Result<ScopePath, StoreError> {
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(ScopePath { segments })
    }

    /// Raw segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_path_requires_odd_segments() {
        assert!(ScopePath::new(["users", "u1", "drafts"]).is_ok());
        assert!(ScopePath::new(["users"]).is_ok());
        assert!(ScopePath::new(["users", "u1"]).is_err());
        assert!(ScopePath::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_record_path_requires_even_segments() {
        assert!(RecordPath::new(["users", "u1", "drafts", "d1"]).is_ok());
        assert!(RecordPath::new(["users", "u1", "drafts"]).is_err());
        assert!(RecordPath::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_segments_reject_slashes_and_empties() {
        assert!(ScopePath::new(["users", "a/b", "drafts"]).is_err());
        assert!(ScopePath::new(["users", "", "drafts"]).is_err());
        let scope = ScopePath::new(["users", "u1", "drafts"]).unwrap();
        assert!(scope.record("a/b").is_err());
        assert!(scope.record("").is_err());
    }

    #[test]
    fn test_nesting_collections_under_records() {
        let scope = ScopePath::new(["users", "u1", "maps"]).unwrap();
        let record = scope.record("m1").unwrap();
        let chunks = record.scope("chunks").unwrap();
        assert_eq!(chunks.to_string(), "users/u1/maps/m1/chunks");
        let chunk = chunks.record("0").unwrap();
        assert_eq!(chunk.to_string(), "users/u1/maps/m1/chunks/0");
        assert_eq!(chunk.id(), "0");
        assert_eq!(chunk.parent(), chunks);
    }

    #[test]
    fn test_display_and_accessors() {
        let record = RecordPath::new(["users", "u1", "projects", "p1"]).unwrap();
        assert_eq!(record.to_string(), "users/u1/projects/p1");
        assert_eq!(record.id(), "p1");
        assert_eq!(record.parent().name(), "projects");
        assert_eq!(record.segments().len(), 4);
    }
}
