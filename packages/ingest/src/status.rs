//! Live run status.
//!
//! Workers update lock-free counters as they go; [`IngestStatus::snapshot`]
//! combines them with the coordinator's latest quota telemetry. With a
//! status interval configured, [`spawn_reporter`] logs the snapshot as JSON
//! until the run drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use armory_api::coordinator::QuotaCoordinator;
use armory_api::progress::{ProgressCallback, null_progress};
use armory_ingest_models::StatusSnapshot;

/// Stored in the ID counters until the first ID is seen.
const UNSET: i64 = i64::MIN;

/// Shared progress counters for one run.
pub struct IngestStatus {
    current: AtomicI64,
    last: AtomicI64,
    total: AtomicU64,
    done: AtomicU64,
    coordinator: Option<Arc<QuotaCoordinator>>,
    progress: Arc<dyn ProgressCallback>,
}

impl IngestStatus {
    /// Creates counters that read quota telemetry from `coordinator` and
    /// forward task counts to `progress`.
    #[must_use]
    pub fn new(
        coordinator: Option<Arc<QuotaCoordinator>>,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            current: AtomicI64::new(UNSET),
            last: AtomicI64::new(UNSET),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
            coordinator,
            progress,
        }
    }

    /// Counters with no quota source and no progress display.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(None, null_progress())
    }

    /// Records that `count` tasks were enqueued.
    pub fn enqueued(&self, count: u64) {
        self.total.fetch_add(count, Ordering::Relaxed);
        self.progress.inc_total(count);
    }

    /// Records that one task finished, whatever its outcome.
    pub fn finished(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.progress.inc(1);
    }

    /// Records the ID a worker just picked up.
    pub fn set_current(&self, id: i64) {
        self.current.store(id, Ordering::Relaxed);
    }

    /// Records that the document for `id` was stored.
    pub fn record_persisted(&self, id: i64) {
        self.last.fetch_max(id, Ordering::Relaxed);
    }

    /// The progress display, for final messages.
    #[must_use]
    pub fn progress(&self) -> &Arc<dyn ProgressCallback> {
        &self.progress
    }

    /// Point-in-time view of the run.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let id = |v: i64| (v != UNSET).then_some(v);
        let quota = self.coordinator.as_ref().and_then(|c| c.latest_quota());

        StatusSnapshot {
            current: id(self.current.load(Ordering::Relaxed)),
            last: id(self.last.load(Ordering::Relaxed)),
            total: self.total.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            quota_now: quota.map(|q| q.total_current),
            quota: quota.map(|q| q.total_max),
        }
    }
}

/// Shortest reporting period; `tokio::time::interval` rejects zero.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Logs `status` as JSON every `interval` (at least
/// [`MIN_REPORT_INTERVAL`]) until the returned handle is aborted.
pub fn spawn_reporter(status: Arc<IngestStatus>, interval: Duration) -> tokio::task::JoinHandle<()> {
    let interval = interval.max(MIN_REPORT_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match serde_json::to_string(&status.snapshot()) {
                Ok(json) => log::info!("status {json}"),
                Err(e) => log::warn!("Failed to serialize status: {e}"),
            }
        }
    })
}
