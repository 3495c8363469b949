#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion options, task outcomes, and status types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 40;

/// What to do with IDs below the resume marker that have no document.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GapPolicy {
    /// Resume strictly after the highest stored key. IDs that were invalid
    /// on an earlier run are never requested again.
    #[default]
    Skip,
    /// Also request every ID between the collection minimum and the resume
    /// marker that has no stored document.
    Revisit,
}

/// Knobs for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Ignore stored progress and start every collection from its minimum.
    pub force: bool,
    /// Handling of IDs below the resume marker.
    pub gap_policy: GapPolicy,
    /// Wait between retries of a throttled (429) request.
    pub throttle_delay: Duration,
    /// Ceiling on requests sent per task while throttled. `None` retries
    /// forever.
    pub max_throttle_attempts: Option<u32>,
    /// Log a [`StatusSnapshot`] at this interval while the run is active.
    pub status_interval: Option<Duration>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            force: false,
            gap_policy: GapPolicy::Skip,
            throttle_delay: Duration::from_secs(1),
            max_throttle_attempts: None,
            status_interval: None,
        }
    }
}

/// Result of executing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The response was stored.
    Persisted {
        /// Number of documents written.
        documents: u64,
    },
    /// The ID has no record (non-200 or undecodable body).
    Skipped,
    /// Transport, throttle or persistence failure.
    Failed,
}

/// Aggregated outcomes of a drained worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    /// Tasks that ran to completion (any outcome, panics included).
    pub completed: u64,
    /// Tasks whose response was stored.
    pub persisted: u64,
    /// Documents written across all persisted tasks.
    pub documents: u64,
    /// Tasks skipped as invalid records.
    pub skipped: u64,
    /// Tasks that failed.
    pub failed: u64,
    /// Tasks that panicked (also counted in `failed`).
    pub panicked: u64,
}

impl PoolSummary {
    /// Folds one outcome into the summary.
    pub const fn record(&mut self, outcome: TaskOutcome) {
        self.completed += 1;
        match outcome {
            TaskOutcome::Persisted { documents } => {
                self.persisted += 1;
                self.documents += documents;
            }
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }

    /// Records a task that panicked.
    pub const fn record_panic(&mut self) {
        self.record(TaskOutcome::Failed);
        self.panicked += 1;
    }

    /// Combines two summaries (one per worker).
    #[must_use]
    pub const fn merge(mut self, other: Self) -> Self {
        self.completed += other.completed;
        self.persisted += other.persisted;
        self.documents += other.documents;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.panicked += other.panicked;
        self
    }
}

/// Point-in-time view of a running ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// ID most recently picked up by a worker.
    pub current: Option<i64>,
    /// Highest ID persisted during this run.
    pub last: Option<i64>,
    /// Tasks enqueued so far.
    pub total: u64,
    /// Tasks finished so far.
    pub done: u64,
    /// Latest observed plan-quota counter.
    pub quota_now: Option<u64>,
    /// Latest observed plan-quota ceiling.
    pub quota: Option<u64>,
}
