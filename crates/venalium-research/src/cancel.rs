//! Cooperative cancellation for long-running pipeline runs.
//!
//! A run holds a [`CancelToken`] and checks it between articles; the UI (or
//! a shutdown hook) holds the paired [`CancelHandle`]. Cancellation is
//! observed at loop boundaries only, so work already persisted stays
//! persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Why a pipeline run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user cancelled the run.
    UserRequested,
    /// The host application is shutting down.
    Shutdown,
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
}

/// Checked inside pipeline loops; pairs with [`CancelHandle`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    /// A token that can never fire, for callers that don't cancel.
    pub fn never() -> Self {
        Self::default()
    }

    /// True once the paired handle fired.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// The reason the handle gave, once cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        self.shared.reason.lock().ok().and_then(|slot| *slot)
    }
}

/// Fires cancellation for the paired [`CancelToken`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Signals the token. Later calls keep the first reason.
    pub fn cancel(&self, reason: CancelReason) {
        if let Ok(mut slot) = self.shared.reason.lock() {
            slot.get_or_insert(reason);
        }
        self.shared.cancelled.store(true, Ordering::Release);
    }
}

/// Creates a connected token/handle pair.
pub fn cancel_pair() -> (CancelToken, CancelHandle) {
    let shared = Arc::new(Shared::default());
    (
        CancelToken {
            shared: Arc::clone(&shared),
        },
        CancelHandle { shared },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let (token, _handle) = cancel_pair();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_cancel_reaches_all_token_clones() {
        let (token, handle) = cancel_pair();
        let clone = token.clone();
        handle.cancel(CancelReason::UserRequested);
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::UserRequested));
    }

    #[test]
    fn test_first_reason_wins() {
        let (token, handle) = cancel_pair();
        handle.cancel(CancelReason::Shutdown);
        handle.cancel(CancelReason::UserRequested);
        assert_eq!(token.reason(), Some(CancelReason::Shutdown));
    }

    #[test]
    fn test_never_token_stays_clear() {
        assert!(!CancelToken::never().is_cancelled());
    }
}
