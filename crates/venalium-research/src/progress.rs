//! Progress reporting over a watch channel.

use tokio::sync::watch;

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// Items finished or in flight.
    pub current: usize,
    /// Items the run will examine.
    pub total: usize,
    /// Human-readable stage description.
    pub message: String,
}

/// Publishes progress updates; UI code holds the matching receiver and
/// always sees the latest value.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<Progress>,
}

impl ProgressReporter {
    /// A reporter plus the receiver to hand to the UI.
    pub fn channel() -> (Self, watch::Receiver<Progress>) {
        let (tx, rx) = watch::channel(Progress::default());
        (Self { tx }, rx)
    }

    /// A reporter that discards updates, for headless callers.
    pub fn sink() -> Self {
        let (tx, _) = watch::channel(Progress::default());
        Self { tx }
    }

    /// Publishes a new position. A dropped receiver is not an error.
    pub fn report(&self, current: usize, total: usize, message: impl Into<String>) {
        let _ = self.tx.send(Progress {
            current,
            total,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receiver_sees_latest_update() {
        let (reporter, rx) = ProgressReporter::channel();
        reporter.report(1, 3, "first");
        reporter.report(2, 3, "second");
        let seen = rx.borrow().clone();
        assert_eq!(seen.current, 2);
        assert_eq!(seen.total, 3);
        assert_eq!(seen.message, "second");
    }

    #[tokio::test]
    async fn test_sink_swallows_updates() {
        let reporter = ProgressReporter::sink();
        reporter.report(1, 1, "done");
    }
}
