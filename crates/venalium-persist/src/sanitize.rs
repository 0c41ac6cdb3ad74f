//! Defensive bounding of caller-supplied JSON before it is stored.
//!
//! Oversized strings are cut to a short prefix plus an explicit marker,
//! arrays keep only their leading elements, and containers nested beyond
//! the depth limit are replaced whole by a sentinel string. Sanitizing is
//! pure and idempotent: running it again over its own output, with the same
//! limits, returns that output unchanged.

use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker appended to strings cut at the truncation prefix.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Characters of the original string kept when it is truncated.
pub const TRUNCATION_PREFIX_CHARS: usize = 500;

/// Sentinel replacing containers nested beyond the depth limit.
pub const DEPTH_SENTINEL: &str = "[max depth exceeded]";

/// Bounds applied to every document before serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeLimits {
    /// Deepest container nesting kept; containers below this are replaced.
    pub max_depth: usize,
    /// Arrays keep at most this many leading elements.
    pub max_array_len: usize,
    /// Strings longer than this (in characters) are truncated.
    pub max_string_len: usize,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_array_len: 5_000,
            max_string_len: 1_000_000,
        }
    }
}

impl SanitizeLimits {
    /// Rejects limits that would silently destroy every document.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.max_depth == 0 {
            return Err(PersistError::Config("max_depth must be at least 1".into()));
        }
        if self.max_array_len == 0 {
            return Err(PersistError::Config(
                "max_array_len must be at least 1".into(),
            ));
        }
        if self.max_string_len == 0 {
            return Err(PersistError::Config(
                "max_string_len must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Counts of the cuts one sanitize pass applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    /// Strings cut down to the truncation prefix.
    pub strings_truncated: u64,
    /// Arrays that lost trailing elements.
    pub arrays_truncated: u64,
    /// Containers replaced by the depth sentinel.
    pub depth_capped: u64,
}

impl SanitizeStats {
    /// True when sanitizing changed nothing.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Returns a bounded copy of `value` plus counts of the cuts applied.
///
/// The input is never mutated. Scalars pass through untouched; strings,
/// arrays, and nesting are bounded by `limits`.
pub fn sanitize(value: &Value, limits: &SanitizeLimits) -> (Value, SanitizeStats) {
    let mut stats = SanitizeStats::default();
    let bounded = bound(value, 0, limits, &mut stats);
    (bounded, stats)
}

fn bound(value: &Value, depth: usize, limits: &SanitizeLimits, stats: &mut SanitizeStats) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => Value::String(bound_string(s, limits, stats)),
        Value::Array(items) => {
            if depth > limits.max_depth {
                stats.depth_capped += 1;
                return Value::String(bounded_sentinel(limits));
            }
            let kept = items.len().min(limits.max_array_len);
            if kept < items.len() {
                stats.arrays_truncated += 1;
            }
            Value::Array(
                items[..kept]
                    .iter()
                    .map(|item| bound(item, depth + 1, limits, stats))
                    .collect(),
            )
        }
        Value::Object(fields) => {
            if depth > limits.max_depth {
                stats.depth_capped += 1;
                return Value::String(bounded_sentinel(limits));
            }
            Value::Object(
                fields
                    .iter()
                    .map(|(key, item)| (key.clone(), bound(item, depth + 1, limits, stats)))
                    .collect(),
            )
        }
    }
}

fn bound_string(s: &str, limits: &SanitizeLimits, stats: &mut SanitizeStats) -> String {
    // byte length bounds char count from above, so short strings skip the count
    if s.len() <= limits.max_string_len || s.chars().count() <= limits.max_string_len {
        return s.to_string();
    }
    stats.strings_truncated += 1;
    truncated(s, limits)
}

fn truncated(s: &str, limits: &SanitizeLimits) -> String {
    let keep = TRUNCATION_PREFIX_CHARS.min(limits.max_string_len);
    let prefix: String = s.chars().take(keep).collect();
    format!("{prefix}{TRUNCATION_MARKER}")
}

// The sentinel passes through the same string rule so a second pass sees a
// string it would leave alone even under tiny string limits.
fn bounded_sentinel(limits: &SanitizeLimits) -> String {
    if DEPTH_SENTINEL.len() <= limits.max_string_len {
        DEPTH_SENTINEL.to_string()
    } else {
        truncated(DEPTH_SENTINEL, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tight(max_depth: usize, max_array_len: usize, max_string_len: usize) -> SanitizeLimits {
        SanitizeLimits {
            max_depth,
            max_array_len,
            max_string_len,
        }
    }

    #[test]
    fn test_scalars_pass_through() {
        let limits = SanitizeLimits::default();
        for value in [json!(null), json!(true), json!(42), json!(2.5), json!("ok")] {
            let (out, stats) = sanitize(&value, &limits);
            assert_eq!(out, value);
            assert!(stats.is_clean());
        }
    }

    #[test]
    fn test_clean_document_is_unchanged() {
        let limits = SanitizeLimits::default();
        let doc = json!({
            "id": "a1",
            "title": "Chunk lifecycles",
            "tags": ["storage", "json"],
            "meta": {"year": 2025}
        });
        let (out, stats) = sanitize(&doc, &limits);
        assert_eq!(out, doc);
        assert!(stats.is_clean());
    }

    #[test]
    fn test_long_string_truncated_with_marker() {
        let limits = SanitizeLimits::default();
        let long = "x".repeat(1_000_001);
        let (out, stats) = sanitize(&json!(long), &limits);
        let s = out.as_str().unwrap();
        assert!(s.starts_with(&"x".repeat(500)));
        assert!(s.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            s.chars().count(),
            TRUNCATION_PREFIX_CHARS + TRUNCATION_MARKER.chars().count()
        );
        assert_eq!(stats.strings_truncated, 1);
    }

    #[test]
    fn test_string_at_limit_is_kept() {
        let limits = tight(8, 10, 16);
        let s = "y".repeat(16);
        let (out, stats) = sanitize(&json!(s.clone()), &limits);
        assert_eq!(out, json!(s));
        assert!(stats.is_clean());
    }

    #[test]
    fn test_multibyte_string_truncates_on_char_boundary() {
        let limits = tight(8, 10, 10);
        let s = "é".repeat(40);
        let (out, _) = sanitize(&json!(s), &limits);
        let out = out.as_str().unwrap().to_string();
        assert!(out.starts_with(&"é".repeat(10)));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_array_keeps_leading_elements() {
        let limits = tight(8, 3, 100);
        let (out, stats) = sanitize(&json!([1, 2, 3, 4, 5]), &limits);
        assert_eq!(out, json!([1, 2, 3]));
        assert_eq!(stats.arrays_truncated, 1);
    }

    #[test]
    fn test_kept_array_elements_are_sanitized() {
        let limits = tight(8, 2, 4);
        let (out, stats) = sanitize(&json!(["abcdefgh", "ok", "dropped"]), &limits);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].as_str().unwrap().ends_with(TRUNCATION_MARKER));
        assert_eq!(items[1], json!("ok"));
        assert_eq!(stats.arrays_truncated, 1);
        assert_eq!(stats.strings_truncated, 1);
    }

    #[test]
    fn test_deep_container_replaced_by_sentinel() {
        let limits = tight(2, 10, 100);
        // depth: root 0, "a" value 1, inner object 2, "c" array 3 -> replaced
        let doc = json!({"a": {"b": 1, "deep": {"c": [1, 2, 3]}}});
        let (out, stats) = sanitize(&doc, &limits);
        assert_eq!(out["a"]["b"], json!(1));
        assert_eq!(out["a"]["deep"]["c"], json!(DEPTH_SENTINEL));
        assert_eq!(stats.depth_capped, 1);
    }

    #[test]
    fn test_default_depth_allows_eight_levels() {
        let limits = SanitizeLimits::default();
        let mut doc = json!("leaf");
        for _ in 0..8 {
            doc = json!({ "next": doc });
        }
        let (out, stats) = sanitize(&doc, &limits);
        assert_eq!(out, doc);
        assert!(stats.is_clean());

        // two more wrappers put the innermost object at depth 9
        doc = json!({ "next": doc });
        doc = json!({ "next": doc });
        let (_, stats) = sanitize(&doc, &limits);
        assert_eq!(stats.depth_capped, 1);
    }

    #[test]
    fn test_idempotent_on_defaults() {
        let limits = SanitizeLimits::default();
        let doc = json!({
            "id": "map",
            "huge": "h".repeat(1_200_000),
            "items": (0..6_000).collect::<Vec<u32>>(),
            "nested": {"a": {"b": {"c": {"d": {"e": {"f": {"g": {"h": {"i": [1]}}}}}}}}}
        });
        let (once, first) = sanitize(&doc, &limits);
        assert!(!first.is_clean());
        let (twice, second) = sanitize(&once, &limits);
        assert_eq!(once, twice);
        assert!(second.is_clean());
    }

    #[test]
    fn test_idempotent_with_tiny_limits() {
        // string cap below both the truncation prefix and the sentinel length
        let limits = tight(1, 1, 5);
        let doc = json!({
            "long": "abcdefghij",
            "deep": {"inner": [1, 2, 3]},
            "many": [1, 2, 3, 4]
        });
        let (once, _) = sanitize(&doc, &limits);
        let (twice, _) = sanitize(&once, &limits);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(tight(0, 5, 5).validate().is_err());
        assert!(tight(5, 0, 5).validate().is_err());
        assert!(tight(5, 5, 0).validate().is_err());
        assert!(SanitizeLimits::default().validate().is_ok());
    }
}
