//! Property-based tests for the pure sanitize and chunk kernels.

use proptest::prelude::*;
use serde_json::Value;
use venalium_persist::chunk::{assemble_chunks, split_chunks};
use venalium_persist::{sanitize, SanitizeLimits};

/// Generates arbitrary JSON values with bounded breadth and depth, biased
/// toward the shapes real documents take.
pub fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 .,;éあ-]{0,60}".prop_map(Value::from),
    ];
    leaf.prop_recursive(6, 96, 10, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..10)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Limits tight enough that generated values regularly trip every cut.
fn arb_tight_limits() -> impl Strategy<Value = SanitizeLimits> {
    (1usize..6, 1usize..5, 1usize..30).prop_map(|(max_depth, max_array_len, max_string_len)| {
        SanitizeLimits {
            max_depth,
            max_array_len,
            max_string_len,
        }
    })
}

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent_under_tight_limits(
        value in arb_value(),
        limits in arb_tight_limits(),
    ) {
        let (once, _) = sanitize(&value, &limits);
        let (twice, _) = sanitize(&once, &limits);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_sanitize_is_idempotent_under_defaults(value in arb_value()) {
        let limits = SanitizeLimits::default();
        let (once, _) = sanitize(&value, &limits);
        let (twice, _) = sanitize(&once, &limits);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_sanitize_never_mutates_its_input(
        value in arb_value(),
        limits in arb_tight_limits(),
    ) {
        let before = value.clone();
        let _ = sanitize(&value, &limits);
        prop_assert_eq!(value, before);
    }

    #[test]
    fn prop_split_respects_chunk_size(
        text in "\\PC{0,300}",
        chunk_size in 1usize..50,
    ) {
        let chunks = split_chunks(&text, chunk_size);
        let char_count = text.chars().count();
        prop_assert_eq!(chunks.len(), char_count.div_ceil(chunk_size));
        for (position, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index as usize, position);
            let len = chunk.data.chars().count();
            if position + 1 < chunks.len() {
                prop_assert_eq!(len, chunk_size);
            } else {
                prop_assert!(len <= chunk_size && len > 0);
            }
        }
    }

    #[test]
    fn prop_split_assemble_round_trips_in_any_order(
        text in "\\PC{1,300}",
        chunk_size in 1usize..50,
        rotate in 0usize..64,
    ) {
        let mut chunks = split_chunks(&text, chunk_size);
        // present the chunks in a scrambled retrieval order
        chunks.reverse();
        let split_at = rotate % chunks.len().max(1);
        chunks.rotate_left(split_at);

        let count = chunks.len() as u32;
        let rebuilt = assemble_chunks(chunks, count).unwrap();
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn prop_assemble_rejects_a_missing_chunk(
        text in "\\PC{1,300}",
        chunk_size in 1usize..20,
    ) {
        let mut chunks = split_chunks(&text, chunk_size);
        prop_assume!(chunks.len() >= 2);
        let expected = chunks.len() as u32;
        chunks.remove(chunks.len() / 2);
        prop_assert!(assemble_chunks(chunks, expected).is_err());
    }

    #[test]
    fn prop_sanitized_output_respects_limits(
        value in arb_value(),
        limits in arb_tight_limits(),
    ) {
        let (bounded, _) = sanitize(&value, &limits);
        check_bounds(&bounded, 0, &limits)?;
    }
}

/// Walks a sanitized value asserting every bound holds. Truncated strings
/// carry a marker suffix, so the length ceiling allows for it.
fn check_bounds(value: &Value, depth: usize, limits: &SanitizeLimits) -> Result<(), TestCaseError> {
    let string_ceiling = limits
        .max_string_len
        .max(500.min(limits.max_string_len) + "...[truncated]".chars().count());
    match value {
        Value::Array(items) => {
            prop_assert!(depth <= limits.max_depth);
            prop_assert!(items.len() <= limits.max_array_len);
            for item in items {
                check_bounds(item, depth + 1, limits)?;
            }
        }
        Value::Object(fields) => {
            prop_assert!(depth <= limits.max_depth);
            for item in fields.values() {
                check_bounds(item, depth + 1, limits)?;
            }
        }
        Value::String(s) => {
            prop_assert!(s.chars().count() <= string_ceiling);
        }
        _ => {}
    }
    Ok(())
}
