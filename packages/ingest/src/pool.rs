//! Fixed-size worker pool over a shared FIFO queue.
//!
//! `N` tokio tasks share one unbounded receiver behind an async mutex and
//! are joined through a [`JoinSet`]. Tasks may be pushed at any time until
//! [`WorkerPool::drain`] closes the queue. A panicking task is caught and
//! counted as failed; its worker moves on to the next task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use armory_ingest_models::{PoolSummary, TaskOutcome};
use async_trait::async_trait;
use futures::FutureExt as _;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::status::IngestStatus;

/// Runs one task to completion.
#[async_trait]
pub trait TaskExecutor<T>: Send + Sync + 'static {
    /// Executes `task`. Failures are reported through the outcome, never
    /// by returning early from the worker.
    async fn execute(&self, task: T) -> TaskOutcome;
}

type SharedReceiver<T> = Arc<Mutex<mpsc::UnboundedReceiver<T>>>;

/// Worker pool processing tasks of type `T`.
pub struct WorkerPool<T> {
    sender: mpsc::UnboundedSender<T>,
    workers: JoinSet<PoolSummary>,
    status: Arc<IngestStatus>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `workers` workers (at least one) that pull from a shared
    /// queue and run each task through `executor`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start<E>(executor: Arc<E>, workers: usize, status: Arc<IngestStatus>) -> Self
    where
        E: TaskExecutor<T>,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver<T> = Arc::new(Mutex::new(receiver));
        let mut set = JoinSet::new();

        let workers = workers.max(1);
        log::debug!("Starting {workers} worker(s)");

        for worker_id in 0..workers {
            set.spawn(run_worker(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&executor),
                Arc::clone(&status),
            ));
        }

        Self {
            sender,
            workers: set,
            status,
        }
    }

    /// Enqueues one task.
    pub fn push(&self, task: T) {
        self.extend(std::iter::once(task));
    }

    /// Enqueues every task in `tasks` and returns how many were added.
    pub fn extend<I>(&self, tasks: I) -> u64
    where
        I: IntoIterator<Item = T>,
    {
        let mut count = 0u64;
        for task in tasks {
            // Receivers live until every worker exits, which only happens
            // after drain() drops the sender.
            if self.sender.send(task).is_err() {
                log::error!("Task queue closed unexpectedly, dropping task");
                break;
            }
            count += 1;
        }
        self.status.enqueued(count);
        count
    }

    /// Closes the queue, waits for every worker to finish the remaining
    /// tasks, and returns the combined outcome counts.
    pub async fn drain(self) -> PoolSummary {
        let Self {
            sender,
            mut workers,
            status: _,
        } = self;
        drop(sender);

        let mut summary = PoolSummary::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_summary) => summary = summary.merge(worker_summary),
                Err(e) => log::error!("Worker terminated abnormally: {e}"),
            }
        }

        summary
    }
}

async fn run_worker<T, E>(
    worker_id: usize,
    receiver: SharedReceiver<T>,
    executor: Arc<E>,
    status: Arc<IngestStatus>,
) -> PoolSummary
where
    T: Send + 'static,
    E: TaskExecutor<T>,
{
    let mut summary = PoolSummary::default();

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        match AssertUnwindSafe(executor.execute(task)).catch_unwind().await {
            Ok(outcome) => summary.record(outcome),
            Err(panic) => {
                log::error!(
                    "worker {worker_id}: task panicked: {}",
                    panic_message(panic.as_ref())
                );
                summary.record_panic();
            }
        }
        status.finished();
    }

    log::trace!("worker {worker_id}: queue drained");
    summary
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
