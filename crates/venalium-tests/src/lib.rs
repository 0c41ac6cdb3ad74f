//! Venalium cross-crate test suites.
//!
//! Scenario tests that exercise the persistence pipeline end to end over the
//! in-memory store, pipeline runs against scripted collaborator fakes, and
//! property tests for the pure sanitize/chunk kernels.

pub mod persistence_suite;
pub mod pipeline_suite;
pub mod proptest_persist;

/// Installs a compact tracing subscriber for test debugging.
///
/// Honors `RUST_LOG`; repeat calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
