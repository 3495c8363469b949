//! Progress reporting for ingest runs.
//!
//! Decouples the worker pool from any rendering backend. The CLI plugs in
//! an `indicatif` bar; tests and `--status-interval`-only runs use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running ingest.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// worker.
pub trait ProgressCallback: Send + Sync {
    /// Adds `delta` units to the expected total (tasks are enqueued in
    /// batches, so the total grows during a run).
    fn inc_total(&self, delta: u64);

    /// Advances progress by `delta` finished units.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn inc_total(&self, _delta: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
