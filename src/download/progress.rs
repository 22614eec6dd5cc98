//! Progress sink
//!
//! Fire-and-forget delivery of [`ProgressSnapshot`]s to whatever host is
//! listening. Publishing never blocks the engine.

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::download::record::ProgressSnapshot;

/// Receiver of download progress notifications
pub trait ProgressSink: Send + Sync {
    fn publish(&self, snapshot: ProgressSnapshot);
}

/// Sink that drops every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _snapshot: ProgressSnapshot) {}
}

impl ProgressSink for UnboundedSender<ProgressSnapshot> {
    fn publish(&self, snapshot: ProgressSnapshot) {
        if self.send(snapshot).is_err() {
            trace!("Progress receiver dropped; snapshot discarded");
        }
    }
}
